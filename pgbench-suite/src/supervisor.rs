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

//! Launches pgbench and watches it from the outside.
//!
//! While a profile runs, the child's output goes straight to its capture file
//! and is never read; the supervisor only polls for liveness and derives
//! progress from wall-clock time, so it cannot perturb the measurement.

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::cli::ConnectionConfig;
use crate::error::SuiteError;
use crate::extract::{self, Metrics, PatternTable, ProgressInterval};
use crate::profile::TestProfile;

pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Lines of raw output shown when a capture yields no throughput.
pub const DIAGNOSTIC_TAIL_LINES: usize = 10;

/// Seconds between pgbench `progress:` lines in verbose mode.
const PROGRESS_EVERY_SECS: u32 = 5;

/// No remaining-time estimate before this much has elapsed.
const ESTIMATE_AFTER: Duration = Duration::from_secs(5);

pub const INIT_OUTPUT_FILE: &str = "init.txt";

/// Hard deadline for `pgbench -i` unless overridden.
pub const INIT_TIMEOUT: Duration = Duration::from_secs(600);

/// How the pgbench process ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Exited by itself. `code` is `None` when it was killed by a signal.
    Exited { code: Option<i32> },
    /// Outlived its deadline and was killed.
    TimedOut,
}

impl RunOutcome {
    fn from_status(status: ExitStatus) -> Self {
        RunOutcome::Exited {
            code: status.code(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Exited { code: Some(0) })
    }

    pub fn describe(&self) -> String {
        match self {
            RunOutcome::Exited { code: Some(code) } => format!("exit code {code}"),
            RunOutcome::Exited { code: None } => "terminated by signal".to_string(),
            RunOutcome::TimedOut => "killed after exceeding its deadline".to_string(),
        }
    }
}

/// Everything known about one profile after its pgbench process was reaped.
#[derive(Clone, Debug, Serialize)]
pub struct RunResult {
    pub profile: TestProfile,
    pub raw_output_path: PathBuf,
    #[serde(flatten)]
    pub metrics: Metrics,
    pub outcome: RunOutcome,
    pub elapsed_secs: f64,
    pub intervals: Vec<ProgressInterval>,
    /// Last lines of the capture, kept only when no throughput was found.
    pub diagnostic_tail: Vec<String>,
}

impl RunResult {
    pub fn tps(&self) -> Option<f64> {
        self.metrics.tps
    }
}

/// Wall-clock progress of a run, independent of anything pgbench prints.
#[derive(Clone, Copy, Debug)]
pub struct Progress {
    pub elapsed: Duration,
    pub duration: Duration,
}

impl Progress {
    pub fn percent(&self) -> f64 {
        if self.duration.is_zero() {
            return 100.0;
        }
        (self.elapsed.as_secs_f64() / self.duration.as_secs_f64() * 100.0).min(100.0)
    }

    /// Estimated time left, once enough has elapsed to bother estimating.
    pub fn remaining(&self) -> Option<Duration> {
        (self.elapsed > ESTIMATE_AFTER).then(|| self.duration.saturating_sub(self.elapsed))
    }

    pub fn render(&self) -> String {
        let mut line = format!(
            "{}/{} ({:.0}%)",
            format_duration(self.elapsed),
            format_duration(self.duration),
            self.percent()
        );
        match self.remaining() {
            Some(left) if left.is_zero() => line.push_str(", finishing up"),
            Some(left) => line.push_str(&format!(", ~{} remaining", format_duration(left))),
            None => {}
        }
        line
    }
}

/// `75s` -> `1m15s`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

/// Kills and reaps the child if it is still running when dropped.
struct ChildGuard(Child);

impl ChildGuard {
    fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.0.try_wait()
    }

    fn kill(&mut self) -> std::io::Result<ExitStatus> {
        self.0.kill()?;
        self.0.wait()
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Ok(None) = self.0.try_wait() {
            let _ = self.0.kill();
            let _ = self.0.wait();
        }
    }
}

/// Runs pgbench, one invocation at a time, into a results directory.
pub struct Supervisor {
    pgbench: PathBuf,
    connection: ConnectionConfig,
    results_dir: PathBuf,
    patterns: PatternTable,
    poll_interval: Duration,
    timeout_grace: Duration,
    init_timeout: Duration,
}

impl Supervisor {
    pub fn new(
        pgbench: PathBuf,
        connection: ConnectionConfig,
        results_dir: PathBuf,
        patterns: PatternTable,
        timeout_grace: Duration,
    ) -> Self {
        Self {
            pgbench,
            connection,
            results_dir,
            patterns,
            poll_interval: POLL_INTERVAL,
            timeout_grace,
            init_timeout: INIT_TIMEOUT,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_init_timeout(mut self, init_timeout: Duration) -> Self {
        self.init_timeout = init_timeout;
        self
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// pgbench with connection arguments. The password only travels in the
    /// child's environment so it never shows up in the process list.
    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.pgbench);
        cmd.arg("-h")
            .arg(&self.connection.host)
            .arg("-p")
            .arg(self.connection.port.to_string())
            .arg("-U")
            .arg(&self.connection.user)
            .env("PGPASSWORD", &self.connection.password)
            .stdin(Stdio::null());
        cmd
    }

    fn run_command(
        &self,
        profile: &TestProfile,
        duration_secs: u64,
        verbose: bool,
    ) -> Command {
        let mut cmd = self.base_command();
        cmd.arg("-c")
            .arg(profile.clients.to_string())
            .arg("-j")
            .arg(profile.jobs.to_string())
            .arg("-T")
            .arg(duration_secs.to_string());
        if verbose {
            cmd.arg(format!("--progress={PROGRESS_EVERY_SECS}"));
        }
        cmd.arg(&self.connection.database);
        cmd
    }

    fn init_command(&self, scale: u32) -> Command {
        let mut cmd = self.base_command();
        cmd.arg("-i")
            .arg("-s")
            .arg(scale.to_string())
            .arg(&self.connection.database);
        cmd
    }

    /// Sends both stdout and stderr of `cmd` to a fresh file at `path`.
    fn redirect_to(cmd: &mut Command, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Could not create {}", path.display()))?;
        let err = file.try_clone()?;
        cmd.stdout(Stdio::from(file)).stderr(Stdio::from(err));
        Ok(())
    }

    fn spawn(&self, cmd: &mut Command) -> Result<ChildGuard> {
        let args: Vec<_> = cmd.get_args().collect();
        debug!(binary = %self.pgbench.display(), ?args, "spawning pgbench");
        let child = cmd.spawn().map_err(|source| SuiteError::Launch {
            binary: self.pgbench.clone(),
            source,
        })?;
        Ok(ChildGuard(child))
    }

    /// Polls `child` until it exits, killing it once `deadline` has passed
    /// since `started`. `tick` runs between polls with the elapsed time.
    fn supervise(
        &self,
        child: &mut ChildGuard,
        started: Instant,
        deadline: Duration,
        mut tick: impl FnMut(Duration) -> Result<()>,
    ) -> Result<RunOutcome> {
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(RunOutcome::from_status(status));
            }
            let elapsed = started.elapsed();
            if elapsed >= deadline {
                child.kill().context("Failed to kill overrunning pgbench")?;
                return Ok(RunOutcome::TimedOut);
            }
            tick(elapsed)?;
            std::thread::sleep(self.poll_interval.min(deadline - elapsed));
        }
    }

    /// Creates the pgbench tables at the given scale factor. A non-zero exit
    /// or an overrun of the init deadline is only a warning; failing to start
    /// pgbench at all is fatal.
    pub fn initialize(&self, scale: u32) -> Result<RunOutcome> {
        let output_path = self.results_dir.join(INIT_OUTPUT_FILE);
        let mut cmd = self.init_command(scale);
        Self::redirect_to(&mut cmd, &output_path)?;

        let started = Instant::now();
        let mut child = self.spawn(&mut cmd)?;
        let outcome = self.supervise(&mut child, started, self.init_timeout, |_| Ok(()))?;
        if !outcome.is_success() {
            warn!(
                output = %output_path.display(),
                "pgbench initialization finished with {}",
                outcome.describe()
            );
        }
        Ok(outcome)
    }

    /// Runs one profile to completion, then extracts its metrics from the
    /// capture file.
    pub fn run_profile(
        &self,
        profile: &TestProfile,
        duration_secs: u64,
        verbose: bool,
    ) -> Result<RunResult> {
        let output_path = self.results_dir.join(profile.output_file_name());
        let mut cmd = self.run_command(profile, duration_secs, verbose);
        Self::redirect_to(&mut cmd, &output_path)?;

        let duration = Duration::from_secs(duration_secs);
        let deadline = duration + self.timeout_grace;
        let started = Instant::now();
        let mut child = self.spawn(&mut cmd)?;

        let outcome = self.supervise(&mut child, started, deadline, |elapsed| {
            let progress = Progress { elapsed, duration };
            print!("\r  {} {}", "⏱".cyan(), progress.render());
            std::io::stdout().flush()?;
            Ok(())
        })?;
        let elapsed = started.elapsed();
        println!(
            "\r  {} {}",
            "⏱".cyan(),
            Progress {
                elapsed: elapsed.min(duration),
                duration
            }
            .render()
        );

        if !outcome.is_success() {
            warn!(
                profile = profile.name,
                output = %output_path.display(),
                "pgbench {}; continuing with captured output",
                outcome.describe()
            );
        }

        let metrics = extract::extract(&self.patterns, &output_path).unwrap_or_else(|e| {
            warn!(profile = profile.name, "could not read capture: {e:#}");
            Metrics::default()
        });
        if metrics.is_empty() {
            warn!(profile = profile.name, "no metrics recognized in capture");
        }
        let intervals = if verbose {
            extract::progress_intervals(&output_path).unwrap_or_default()
        } else {
            vec![]
        };
        let diagnostic_tail = if metrics.tps.is_none() {
            extract::tail_lines(&output_path, DIAGNOSTIC_TAIL_LINES).unwrap_or_default()
        } else {
            vec![]
        };

        Ok(RunResult {
            profile: *profile,
            raw_output_path: output_path,
            metrics,
            outcome,
            elapsed_secs: elapsed.as_secs_f64(),
            intervals,
            diagnostic_tail,
        })
    }
}
