// Copyright (c) 2023-2025 Retake, Inc.
//
// This file is part of ParadeDB - Postgres for Search and Analytics
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 (AGPLv3) or (at your option)
// any later version.
//
// This program is distributed in the hope that it will be useful
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

use clap::Parser;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Run a fixed battery of pgbench load profiles against a PostgreSQL database
/// and summarize the throughput of each.
#[derive(Parser, Debug)]
#[command(name = "pgbench-suite", version, about)]
pub struct Cli {
    /// Database host.
    #[arg(long, env = "PGHOST", default_value = "localhost")]
    pub host: String,

    /// Database port.
    #[arg(long, env = "PGPORT", default_value_t = 5432)]
    pub port: u16,

    /// Database user.
    #[arg(long, env = "PGUSER", default_value = "postgres")]
    pub user: String,

    /// Database password. Handed to pgbench through PGPASSWORD.
    #[arg(long, env = "PGPASSWORD", default_value = "postgres", hide_env_values = true)]
    pub password: String,

    /// Database name.
    #[arg(long, env = "PGDATABASE", default_value = "testdb")]
    pub database: String,

    /// Scale factor passed to `pgbench -i`.
    #[arg(long, env = "SCALE_FACTOR", default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
    pub scale: u32,

    /// Duration of each profile, in seconds.
    #[arg(long, env = "TEST_DURATION", default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    pub duration: u64,

    /// Ask pgbench for periodic progress lines and print extra detail.
    #[arg(long, env = "VERBOSE", default_value_t = false)]
    pub verbose: bool,

    /// pgbench binary to run.
    #[arg(long, env = "PGBENCH_BIN", default_value = "pgbench")]
    pub pgbench: PathBuf,

    /// Directory in which the timestamped results folder is created.
    #[arg(long, env = "RESULTS_ROOT", default_value = ".")]
    pub results_root: PathBuf,

    /// Seconds a profile may overrun its duration before pgbench is killed.
    #[arg(long, env = "TIMEOUT_GRACE", default_value_t = 120)]
    pub timeout_grace: u64,

    /// Seconds `pgbench -i` may run before it is killed.
    #[arg(long, env = "INIT_TIMEOUT", default_value_t = 600)]
    pub init_timeout: u64,

    /// JSON file overriding the metric extraction patterns.
    #[arg(long, env = "PGBENCH_PATTERNS")]
    pub patterns: Option<PathBuf>,

    /// Reuse the existing pgbench tables instead of running `pgbench -i`.
    #[arg(long, env = "SKIP_INIT", default_value_t = false)]
    pub skip_init: bool,
}

impl Default for Cli {
    fn default() -> Self {
        Self::parse()
    }
}

/// Where and as whom to connect. Shared by the precheck and every pgbench
/// invocation.
#[derive(Clone, Serialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(skip)]
    pub password: String,
    pub database: String,
}

impl ConnectionConfig {
    /// `user@host:port/database`, safe to print.
    pub fn target(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

/// Everything the suite needs once the command line has been parsed.
#[derive(Clone, Debug, Serialize)]
pub struct SuiteConfig {
    pub connection: ConnectionConfig,
    pub scale: u32,
    pub duration_secs: u64,
    pub verbose: bool,
    pub pgbench: PathBuf,
    pub results_root: PathBuf,
    pub timeout_grace: Duration,
    pub init_timeout: Duration,
    pub patterns: Option<PathBuf>,
    pub skip_init: bool,
}

impl From<Cli> for SuiteConfig {
    fn from(cli: Cli) -> Self {
        Self {
            connection: ConnectionConfig {
                host: cli.host,
                port: cli.port,
                user: cli.user,
                password: cli.password,
                database: cli.database,
            },
            scale: cli.scale,
            duration_secs: cli.duration,
            verbose: cli.verbose,
            pgbench: cli.pgbench,
            results_root: cli.results_root,
            timeout_grace: Duration::from_secs(cli.timeout_grace),
            init_timeout: Duration::from_secs(cli.init_timeout),
            patterns: cli.patterns,
            skip_init: cli.skip_init,
        }
    }
}
