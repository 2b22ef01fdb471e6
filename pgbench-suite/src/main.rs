mod band;
mod cli;
mod error;
mod extract;
mod host;
mod precheck;
mod profile;
mod report;
mod suite;
mod supervisor;

use anyhow::Result;
use async_std::task::block_on;
use cli::{Cli, SuiteConfig};
use dotenvy::dotenv;
use suite::BenchmarkSuite;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load env vars from a .env in any parent folder.
    dotenv().ok();

    let config = SuiteConfig::from(Cli::default());
    tracing::debug!(?config, "starting pgbench battery");

    let mut suite = block_on(BenchmarkSuite::new(config))?;
    suite.run_all_benchmarks()?;

    Ok(())
}
