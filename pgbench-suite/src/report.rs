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

//! Summary of a finished battery.
//!
//! [`aggregate`] reduces the run results to plain values. Rendering goes
//! through a list of styled [`Line`]s so the persisted `summary.txt` and the
//! colored console narrative always carry the same text; only the console
//! renderer applies color.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use colored::{ColoredString, Colorize};
use itertools::Itertools;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::band::{classify, PerformanceBand};
use crate::host::HostInfo;
use crate::supervisor::{format_duration, RunResult};

pub const SUMMARY_TEXT_FILE: &str = "summary.txt";
pub const SUMMARY_JSON_FILE: &str = "summary.json";

/// Worst-case TPS below which the battery is flagged.
pub const CONCERN_THRESHOLD_TPS: f64 = 100.0;

/// A profile picked out as best or worst.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Extreme {
    pub profile: &'static str,
    pub tps: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    PerformanceConcerns,
    GoodPerformance,
}

impl Recommendation {
    pub fn for_worst_tps(tps: f64) -> Self {
        if tps < CONCERN_THRESHOLD_TPS {
            Recommendation::PerformanceConcerns
        } else {
            Recommendation::GoodPerformance
        }
    }

    pub fn headline(&self) -> &'static str {
        match self {
            Recommendation::PerformanceConcerns => {
                "Performance concerns: at least one profile stayed under 100 TPS."
            }
            Recommendation::GoodPerformance => {
                "Good performance: every profile sustained at least 100 TPS."
            }
        }
    }

    pub fn advice(&self) -> &'static [&'static str] {
        match self {
            Recommendation::PerformanceConcerns => &[
                "Check hardware headroom: CPU saturation, memory pressure and disk I/O latency.",
                "Review configuration: shared_buffers, work_mem, effective_cache_size, max_connections.",
                "Put a connection pooler such as PgBouncer in front of high client counts.",
                "Look for lock contention and long-running transactions during the run.",
            ],
            Recommendation::GoodPerformance => &[
                "The database handled every load profile comfortably.",
                "Re-run with a larger scale factor or longer duration to probe further.",
            ],
        }
    }
}

/// The outcome of a whole battery. Built once, never mutated.
#[derive(Clone, Debug, Serialize)]
pub struct SummaryReport {
    pub results: Vec<RunResult>,
    pub best: Option<Extreme>,
    pub worst: Option<Extreme>,
    pub recommendation: Option<Recommendation>,
}

/// Picks best and worst profile by TPS. Ties go to the profile that ran
/// first. Results without a TPS are ignored, so with none usable both
/// extremes and the recommendation are absent.
pub fn aggregate(results: Vec<RunResult>) -> SummaryReport {
    let mut best: Option<Extreme> = None;
    let mut worst: Option<Extreme> = None;

    for result in &results {
        let Some(tps) = result.tps() else {
            continue;
        };
        let candidate = Extreme {
            profile: result.profile.name,
            tps,
        };
        if best.as_ref().map_or(true, |b| tps > b.tps) {
            best = Some(candidate.clone());
        }
        if worst.as_ref().map_or(true, |w| tps < w.tps) {
            worst = Some(candidate);
        }
    }

    let recommendation = worst.as_ref().map(|w| Recommendation::for_worst_tps(w.tps));
    SummaryReport {
        results,
        best,
        worst,
        recommendation,
    }
}

/// Facts about the invocation printed in the report header.
#[derive(Clone, Debug, Serialize)]
pub struct RunInfo {
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub target: String,
    pub server_version: String,
    pub scale: u32,
    pub duration_secs: u64,
    pub host: HostInfo,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Style {
    Plain,
    Heading,
    Dim,
    Good,
    Warn,
    Bad,
    Band(PerformanceBand),
}

#[derive(Clone, Debug)]
struct Line {
    text: String,
    style: Style,
}

impl Line {
    fn new(style: Style, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }

    fn colored(&self) -> ColoredString {
        let text = self.text.as_str();
        match self.style {
            Style::Plain => text.normal(),
            Style::Heading => text.bold().cyan(),
            Style::Dim => text.dimmed(),
            Style::Good => text.green(),
            Style::Warn => text.yellow(),
            Style::Bad => text.red(),
            Style::Band(band) => match band {
                PerformanceBand::Excellent | PerformanceBand::Good => text.green(),
                PerformanceBand::Fair => text.yellow(),
                PerformanceBand::Poor | PerformanceBand::VeryPoor => text.red(),
            },
        }
    }
}

fn ms(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.3} ms"))
        .unwrap_or_else(|| "n/a".to_string())
}

fn result_lines(result: &RunResult, out: &mut Vec<Line>) {
    let profile = &result.profile;
    out.push(Line::new(
        Style::Heading,
        format!(
            "{} ({} clients, {} jobs) - {}",
            profile.name, profile.clients, profile.jobs, profile.description
        ),
    ));

    match result.tps() {
        Some(tps) => {
            let (label, style) = match classify(tps) {
                Ok(band) => (band.to_string(), Style::Band(band)),
                Err(_) => ("unclassifiable".to_string(), Style::Warn),
            };
            out.push(Line::new(style, format!("  TPS:              {tps:.2} [{label}]")));
        }
        None => {
            out.push(Line::new(
                Style::Bad,
                "  TPS:              parsing error, no throughput line found",
            ));
        }
    }
    out.push(Line::new(
        Style::Plain,
        format!("  Avg latency:      {}", ms(result.metrics.avg_latency_ms)),
    ));
    out.push(Line::new(
        Style::Plain,
        format!("  Connection time:  {}", ms(result.metrics.connection_time_ms)),
    ));
    out.push(Line::new(
        Style::Plain,
        format!(
            "  Failed txns:      {}",
            result
                .metrics
                .failed_transactions
                .map(|f| f.to_string())
                .unwrap_or_else(|| "n/a".to_string())
        ),
    ));
    let outcome_style = if result.outcome.is_success() {
        Style::Plain
    } else {
        Style::Warn
    };
    out.push(Line::new(
        outcome_style,
        format!(
            "  pgbench:          {} after {:.1}s",
            result.outcome.describe(),
            result.elapsed_secs
        ),
    ));
    if !result.intervals.is_empty() {
        let (lo, hi) = result
            .intervals
            .iter()
            .map(|i| i.tps)
            .minmax()
            .into_option()
            .unwrap_or_default();
        out.push(Line::new(
            Style::Plain,
            format!(
                "  Interval TPS:     {lo:.1} - {hi:.1} over {} samples",
                result.intervals.len()
            ),
        ));
    }
    out.push(Line::new(
        Style::Dim,
        format!("  Raw output:       {}", result.raw_output_path.display()),
    ));
    if !result.diagnostic_tail.is_empty() {
        out.push(Line::new(Style::Warn, "  Last lines of raw output:"));
        for raw in &result.diagnostic_tail {
            out.push(Line::new(Style::Dim, format!("    | {raw}")));
        }
    }
    out.push(Line::new(Style::Plain, ""));
}

fn report_lines(report: &SummaryReport, info: &RunInfo) -> Vec<Line> {
    let mut out = vec![
        Line::new(Style::Heading, "pgbench performance report"),
        Line::new(
            Style::Plain,
            format!("Started:   {}", info.started_at.format("%Y-%m-%d %H:%M:%S")),
        ),
        Line::new(
            Style::Plain,
            format!("Finished:  {}", info.finished_at.format("%Y-%m-%d %H:%M:%S")),
        ),
        Line::new(Style::Plain, format!("Target:    {}", info.target)),
        Line::new(Style::Plain, format!("Server:    {}", info.server_version)),
        Line::new(
            Style::Plain,
            format!(
                "Workload:  scale factor {}, {} per profile",
                info.scale,
                format_duration(std::time::Duration::from_secs(info.duration_secs))
            ),
        ),
        Line::new(
            Style::Plain,
            format!(
                "Client:    {} ({}, {} CPUs, {})",
                info.host.host_name.as_deref().unwrap_or("unknown host"),
                info.host.os.as_deref().unwrap_or("unknown OS"),
                info.host.cpu_count,
                info.host.total_memory
            ),
        ),
        Line::new(Style::Plain, ""),
    ];

    for result in &report.results {
        result_lines(result, &mut out);
    }

    out.push(Line::new(Style::Heading, "Summary"));
    match (&report.best, &report.worst) {
        (Some(best), Some(worst)) => {
            out.push(Line::new(
                Style::Good,
                format!("  Best:  {} at {:.2} TPS", best.profile, best.tps),
            ));
            out.push(Line::new(
                Style::Warn,
                format!("  Worst: {} at {:.2} TPS", worst.profile, worst.tps),
            ));
        }
        _ => out.push(Line::new(
            Style::Bad,
            "  No profile produced a usable TPS figure; check the raw output files.",
        )),
    }
    out.push(Line::new(Style::Plain, ""));

    if let Some(recommendation) = report.recommendation {
        out.push(Line::new(Style::Heading, "Recommendation"));
        let style = match recommendation {
            Recommendation::PerformanceConcerns => Style::Bad,
            Recommendation::GoodPerformance => Style::Good,
        };
        out.push(Line::new(style, format!("  {}", recommendation.headline())));
        for advice in recommendation.advice() {
            out.push(Line::new(Style::Plain, format!("  - {advice}")));
        }
    }
    out
}

/// Plain text, as persisted to `summary.txt`.
pub fn render_plain(report: &SummaryReport, info: &RunInfo) -> String {
    let mut text = report_lines(report, info).iter().map(|l| &l.text).join("\n");
    text.push('\n');
    text
}

/// Same text as [`render_plain`], colored for a terminal.
pub fn render_console(report: &SummaryReport, info: &RunInfo) -> String {
    report_lines(report, info)
        .iter()
        .map(Line::colored)
        .join("\n")
}

#[derive(Serialize)]
struct SummaryDocument<'a> {
    info: &'a RunInfo,
    #[serde(flatten)]
    report: &'a SummaryReport,
}

/// Writes `summary.txt` and `summary.json` into `dir`, returning their paths.
pub fn write_artifacts(
    dir: &Path,
    report: &SummaryReport,
    info: &RunInfo,
) -> Result<(PathBuf, PathBuf)> {
    let text_path = dir.join(SUMMARY_TEXT_FILE);
    fs::write(&text_path, render_plain(report, info))
        .with_context(|| format!("Could not write {}", text_path.display()))?;

    let json_path = dir.join(SUMMARY_JSON_FILE);
    let json = serde_json::to_string_pretty(&SummaryDocument { info, report })?;
    fs::write(&json_path, json)
        .with_context(|| format!("Could not write {}", json_path.display()))?;

    Ok((text_path, json_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Metrics;
    use crate::profile::BATTERY;
    use crate::supervisor::RunOutcome;
    use regex::Regex;

    fn run(index: usize, tps: Option<f64>) -> RunResult {
        let profile = BATTERY[index];
        RunResult {
            profile,
            raw_output_path: PathBuf::from(profile.output_file_name()),
            metrics: Metrics {
                tps,
                avg_latency_ms: tps.map(|t| 1000.0 / t),
                connection_time_ms: None,
                failed_transactions: Some(0),
            },
            outcome: RunOutcome::Exited { code: Some(0) },
            elapsed_secs: 60.2,
            intervals: vec![],
            diagnostic_tail: if tps.is_none() {
                vec!["pgbench: error: could not connect".to_string()]
            } else {
                vec![]
            },
        }
    }

    fn info() -> RunInfo {
        let now = Local::now();
        RunInfo {
            started_at: now,
            finished_at: now,
            target: "postgres@localhost:5432/testdb".into(),
            server_version: "PostgreSQL 16.2".into(),
            scale: 10,
            duration_secs: 60,
            host: HostInfo {
                host_name: Some("bench-01".into()),
                os: Some("Linux 6.1".into()),
                cpu_count: 8,
                total_memory: "32.00GB".into(),
            },
        }
    }

    fn battery(tps: [Option<f64>; 4]) -> Vec<RunResult> {
        tps.into_iter().enumerate().map(|(i, t)| run(i, t)).collect()
    }

    #[test]
    fn four_profile_scenario() {
        let report = aggregate(battery([Some(1200.0), Some(650.0), Some(250.0), Some(40.0)]));

        let bands: Vec<PerformanceBand> = report
            .results
            .iter()
            .map(|r| classify(r.tps().unwrap()).unwrap())
            .collect();
        assert_eq!(
            bands,
            [
                PerformanceBand::Excellent,
                PerformanceBand::Good,
                PerformanceBand::Fair,
                PerformanceBand::VeryPoor
            ]
        );
        assert_eq!(
            report.best,
            Some(Extreme {
                profile: "Light Load",
                tps: 1200.0
            })
        );
        assert_eq!(
            report.worst,
            Some(Extreme {
                profile: "Stress Test",
                tps: 40.0
            })
        );
        assert_eq!(
            report.recommendation,
            Some(Recommendation::PerformanceConcerns)
        );
    }

    #[test]
    fn healthy_battery_gets_good_performance() {
        let report = aggregate(battery([Some(900.0), Some(400.0), Some(150.0), Some(100.0)]));
        assert_eq!(report.worst.as_ref().map(|w| w.tps), Some(100.0));
        assert_eq!(report.recommendation, Some(Recommendation::GoodPerformance));
    }

    #[test]
    fn empty_and_all_absent_have_no_extremes() {
        for report in [aggregate(vec![]), aggregate(battery([None; 4]))] {
            assert_eq!(report.best, None);
            assert_eq!(report.worst, None);
            assert_eq!(report.recommendation, None);
        }
    }

    #[test]
    fn absent_values_are_skipped_not_zeroed() {
        let report = aggregate(battery([None, Some(300.0), None, Some(250.0)]));
        assert_eq!(report.best.unwrap().profile, "Medium Load");
        assert_eq!(report.worst.unwrap().profile, "Stress Test");
    }

    #[test]
    fn ties_go_to_first_profile() {
        let report = aggregate(battery([Some(80.0), Some(500.0), Some(80.0), Some(500.0)]));
        assert_eq!(report.best.unwrap().profile, "Medium Load");
        assert_eq!(report.worst.unwrap().profile, "Light Load");
    }

    #[test]
    fn plain_text_has_no_color_codes() {
        let report = aggregate(battery([Some(1200.0), Some(650.0), Some(180.0), None]));
        let text = render_plain(&report, &info());

        assert!(!text.contains('\u{1b}'));
        assert!(text.contains("TPS:              1200.00 [Excellent]"));
        assert!(text.contains("parsing error"));
        assert!(text.contains("| pgbench: error: could not connect"));
        assert!(text.contains("Best:  Light Load at 1200.00 TPS"));
        assert!(text.contains("Worst: Heavy Load at 180.00 TPS"));
        assert!(text.contains(Recommendation::GoodPerformance.headline()));
    }

    #[test]
    fn console_and_plain_carry_the_same_text() {
        colored::control::set_override(true);
        let report = aggregate(battery([Some(1200.0), Some(650.0), Some(180.0), Some(40.0)]));
        let info = info();
        let console = render_console(&report, &info);
        colored::control::unset_override();

        let ansi = Regex::new(r"\x1b\[[0-9;]*m").unwrap();
        let stripped = ansi.replace_all(&console, "");
        assert!(console.contains('\u{1b}'));
        assert_eq!(format!("{stripped}\n"), render_plain(&report, &info));
    }

    #[test]
    fn degenerate_report_skips_recommendation() {
        let report = aggregate(battery([None; 4]));
        let text = render_plain(&report, &info());
        assert!(text.contains("No profile produced a usable TPS figure"));
        assert!(!text.contains("Recommendation"));
    }

    #[test]
    fn writes_text_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let report = aggregate(battery([Some(1200.0), Some(650.0), Some(180.0), Some(40.0)]));
        let (text_path, json_path) = write_artifacts(dir.path(), &report, &info()).unwrap();

        let text = fs::read_to_string(text_path).unwrap();
        assert!(text.contains("Worst: Stress Test at 40.00 TPS"));

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(json_path).unwrap()).unwrap();
        assert_eq!(json["worst"]["tps"], 40.0);
        assert_eq!(json["recommendation"], "performance_concerns");
        assert_eq!(json["results"][0]["tps"], 1200.0);
        assert_eq!(json["results"][0]["outcome"]["kind"], "exited");
        assert_eq!(json["info"]["scale"], 10);
    }
}
