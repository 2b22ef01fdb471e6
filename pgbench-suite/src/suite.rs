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

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use colored::Colorize;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::band::classify;
use crate::cli::SuiteConfig;
use crate::extract::PatternTable;
use crate::host::HostInfo;
use crate::precheck::check_connectivity;
use crate::profile::BATTERY;
use crate::report::{aggregate, render_console, write_artifacts, RunInfo, SummaryReport};
use crate::supervisor::{RunResult, Supervisor};

/// Primary orchestrator: precheck, init, the profile battery, then the summary.
pub struct BenchmarkSuite {
    config: SuiteConfig,
    supervisor: Supervisor,
    server_version: String,
    started_at: DateTime<Local>,
}

impl BenchmarkSuite {
    /// Verify connectivity before anything touches the filesystem. An
    /// unreachable server aborts here, with no profile attempted.
    pub async fn new(config: SuiteConfig) -> Result<Self> {
        let patterns = load_patterns(&config)?;

        println!(
            "Checking connection to {} ...",
            config.connection.target().bold()
        );
        let server_version = check_connectivity(&config.connection).await?;
        println!("{} {}", "Connected:".green(), server_version);

        Self::prepare(config, patterns, server_version)
    }

    /// Creates the timestamped results directory for this invocation.
    fn prepare(config: SuiteConfig, patterns: PatternTable, server_version: String) -> Result<Self> {
        let started_at = Local::now();
        let results_dir = config.results_root.join(format!(
            "pgbench_results_{}",
            started_at.format("%Y%m%d_%H%M%S")
        ));
        fs::create_dir_all(&results_dir)
            .with_context(|| format!("Could not create {}", results_dir.display()))?;
        info!(dir = %results_dir.display(), "writing results");

        let supervisor = Supervisor::new(
            config.pgbench.clone(),
            config.connection.clone(),
            results_dir,
            patterns,
            config.timeout_grace,
        )
        .with_init_timeout(config.init_timeout);
        Ok(Self {
            config,
            supervisor,
            server_version,
            started_at,
        })
    }

    pub fn results_dir(&self) -> &Path {
        self.supervisor.results_dir()
    }

    /// Main entry point to run everything. Profiles run strictly one after
    /// another; only launch failures and filesystem errors stop the battery.
    pub fn run_all_benchmarks(&mut self) -> Result<SummaryReport> {
        if self.config.skip_init {
            println!("Skipping initialization, reusing existing pgbench tables.");
        } else {
            println!(
                "Initializing pgbench tables at scale factor {} ...",
                self.config.scale
            );
            let outcome = self.supervisor.initialize(self.config.scale)?;
            if !outcome.is_success() {
                println!(
                    "{} initialization finished with {}; see {}",
                    "Warning:".yellow(),
                    outcome.describe(),
                    self.results_dir().join(crate::supervisor::INIT_OUTPUT_FILE).display()
                );
            }
        }

        let mut results = Vec::with_capacity(BATTERY.len());
        for (i, profile) in BATTERY.iter().enumerate() {
            println!(
                "\n[{}/{}] {} - {} clients, {} jobs, {}s",
                i + 1,
                BATTERY.len(),
                profile.name.bold(),
                profile.clients,
                profile.jobs,
                self.config.duration_secs
            );
            let result = self.supervisor.run_profile(
                profile,
                self.config.duration_secs,
                self.config.verbose,
            )?;
            print_profile_outcome(&result, self.config.verbose);
            results.push(result);
        }

        let report = aggregate(results);
        let run_info = RunInfo {
            started_at: self.started_at,
            finished_at: Local::now(),
            target: self.config.connection.target(),
            server_version: self.server_version.clone(),
            scale: self.config.scale,
            duration_secs: self.config.duration_secs,
            host: HostInfo::collect(),
        };

        println!("\n{}", render_console(&report, &run_info));
        let (text_path, json_path) = write_artifacts(self.results_dir(), &report, &run_info)?;
        println!(
            "\nAll profiles complete; summary written to {} and {}",
            text_path.display(),
            json_path.display()
        );
        Ok(report)
    }
}

fn load_patterns(config: &SuiteConfig) -> Result<PatternTable> {
    let table = match &config.patterns {
        Some(path) => PatternTable::from_json_file(path)?,
        None => PatternTable::builtin()?,
    };
    Ok(table)
}

fn print_profile_outcome(result: &RunResult, verbose: bool) {
    for line in profile_outcome_lines(result, verbose) {
        println!("{line}");
    }
}

/// Console lines reported after a profile. An unclean exit is always shown,
/// whatever the log filter.
fn profile_outcome_lines(result: &RunResult, verbose: bool) -> Vec<String> {
    let mut lines = vec![];
    if !result.outcome.is_success() {
        lines.push(format!(
            "  {} pgbench {}; see {}",
            "Warning:".yellow(),
            result.outcome.describe(),
            result.raw_output_path.display()
        ));
    }
    match result.tps() {
        Some(tps) => {
            let band = classify(tps)
                .map(|b| b.to_string())
                .unwrap_or_else(|e| e.to_string());
            lines.push(format!("  {} {tps:.2} TPS ({band})", "Result:".green()));
        }
        None => {
            lines.push(format!(
                "  {} could not find a TPS line in {}",
                "Parsing error:".red(),
                result.raw_output_path.display()
            ));
            lines.extend(
                result
                    .diagnostic_tail
                    .iter()
                    .map(|line| format!("    {}", line.dimmed())),
            );
        }
    }
    if verbose {
        if let Some(latency) = result.metrics.avg_latency_ms {
            lines.push(format!("  latency average {latency:.3} ms"));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ConnectionConfig;
    use crate::error::SuiteError;
    use crate::extract::Metrics;
    use crate::supervisor::RunOutcome;
    use async_std::task::block_on;
    use rstest::rstest;
    use std::path::PathBuf;
    use std::time::Duration;

    fn config(pgbench: PathBuf, results_root: &Path, port: u16) -> SuiteConfig {
        SuiteConfig {
            connection: ConnectionConfig {
                host: "127.0.0.1".into(),
                port,
                user: "postgres".into(),
                password: "postgres".into(),
                database: "testdb".into(),
            },
            scale: 1,
            duration_secs: 1,
            verbose: false,
            pgbench,
            results_root: results_root.to_path_buf(),
            timeout_grace: Duration::from_secs(30),
            init_timeout: Duration::from_secs(30),
            patterns: None,
            skip_init: false,
        }
    }

    #[test]
    fn unreachable_database_aborts_before_any_profile() {
        let root = tempfile::tempdir().unwrap();
        let config = config(root.path().join("pgbench"), root.path(), 1);

        let err = match block_on(BenchmarkSuite::new(config)) {
            Ok(_) => panic!("suite started without a database"),
            Err(err) => err,
        };
        assert!(matches!(
            err.downcast_ref::<SuiteError>(),
            Some(SuiteError::Connectivity { .. })
        ));
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn bad_pattern_file_fails_before_connecting() {
        let root = tempfile::tempdir().unwrap();
        let patterns = root.path().join("patterns.json");
        fs::write(&patterns, r#"{"tps": ["("]}"#).unwrap();
        let mut config = config(root.path().join("pgbench"), root.path(), 1);
        config.patterns = Some(patterns);

        let err = block_on(BenchmarkSuite::new(config)).err().unwrap();
        assert!(err.downcast_ref::<crate::extract::PatternError>().is_some());
    }

    fn result(outcome: RunOutcome, tps: Option<f64>) -> RunResult {
        RunResult {
            profile: BATTERY[2],
            raw_output_path: PathBuf::from("results/heavy_load.txt"),
            metrics: Metrics {
                tps,
                ..Metrics::default()
            },
            outcome,
            elapsed_secs: 1.0,
            intervals: vec![],
            diagnostic_tail: vec![],
        }
    }

    #[rstest]
    #[case(RunOutcome::Exited { code: Some(2) }, "exit code 2")]
    #[case(RunOutcome::Exited { code: None }, "terminated by signal")]
    #[case(RunOutcome::TimedOut, "killed after exceeding its deadline")]
    fn unclean_exit_is_reported_on_console(#[case] outcome: RunOutcome, #[case] expected: &str) {
        let lines = profile_outcome_lines(&result(outcome, Some(250.0)), false);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Warning:"));
        assert!(lines[0].contains(&format!("pgbench {expected}; see results/heavy_load.txt")));
        assert!(lines[1].contains("250.00 TPS (Fair)"));
    }

    #[test]
    fn clean_exit_prints_only_the_result() {
        let clean = result(RunOutcome::Exited { code: Some(0) }, Some(40.0));
        let lines = profile_outcome_lines(&clean, false);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("40.00 TPS (Very Poor)"));
    }

    #[cfg(unix)]
    #[test]
    fn runs_full_battery_against_fake_pgbench() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().unwrap();
        let bin = root.path().join("fake-pgbench");
        fs::write(
            &bin,
            r#"#!/bin/sh
case "$*" in
  *" -i "*) echo "done in 0.10 s" ;;
  *"-c 5 "*) echo "tps = 1200.0 (without initial connection time)" ;;
  *"-c 20 "*) echo "tps = 650.0 (without initial connection time)" ;;
  *"-c 50 "*) echo "tps = 180.0 (without initial connection time)" ;;
  *"-c 100 "*) echo "tps = 40.0 (without initial connection time)" ;;
esac
"#,
        )
        .unwrap();
        fs::set_permissions(&bin, fs::Permissions::from_mode(0o755)).unwrap();

        let config = config(bin, root.path(), 5432);
        let mut suite = BenchmarkSuite::prepare(
            config,
            PatternTable::builtin().unwrap(),
            "PostgreSQL 16.2".into(),
        )
        .unwrap();
        suite.supervisor = suite
            .supervisor
            .with_poll_interval(Duration::from_millis(50));

        let report = suite.run_all_benchmarks().unwrap();
        let dir = suite.results_dir().to_path_buf();

        assert_eq!(report.results.len(), 4);
        assert_eq!(report.best.as_ref().unwrap().profile, "Light Load");
        assert_eq!(report.worst.as_ref().unwrap().tps, 40.0);
        for file in [
            "init.txt",
            "light_load.txt",
            "medium_load.txt",
            "heavy_load.txt",
            "stress_test.txt",
            "summary.txt",
            "summary.json",
        ] {
            assert!(dir.join(file).exists(), "missing {file}");
        }
        assert!(dir
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("pgbench_results_"));
    }
}
