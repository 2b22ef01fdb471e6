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

//! Pulls numbers out of pgbench's free-text report.
//!
//! pgbench has reworded its summary several times across releases, so every
//! metric is looked up through an ordered list of regexes. The first pattern
//! that matches (and parses) wins; later entries in each list are looser
//! fallbacks. The lists live in a [`PatternTable`] so new wordings can be added
//! from a JSON file without touching classification or aggregation.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use strum::{Display, EnumIter, IntoEnumIterator};
use thiserror::Error;

const NUM: &str = r"([\d,]+(?:\.\d+)?)";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Metric {
    Tps,
    Latency,
    ConnectionTime,
    Failed,
}

impl Metric {
    fn builtin_patterns(self) -> Vec<String> {
        let p = |s: &str| s.replace("{NUM}", NUM);
        match self {
            Metric::Tps => vec![
                p(r"tps = {NUM} \(including connections establishing\)"),
                p(r"tps = {NUM} \(without initial connection time\)"),
                p(r"tps = {NUM}"),
                p(r"\b{NUM}\s*tps\b"),
            ],
            Metric::Latency => vec![
                p(r"latency average = {NUM} ms"),
                p(r"latency average: {NUM} ms"),
                p(r"(?i)latency[^\n=:]*[=:]\s*{NUM}\s*ms"),
                p(r"\blat {NUM} ms"),
            ],
            Metric::ConnectionTime => vec![
                p(r"initial connection time = {NUM} ms"),
                p(r"average connection time = {NUM} ms"),
                p(r"(?i)connection[^\n=:]*[=:]\s*{NUM}\s*ms"),
            ],
            Metric::Failed => vec![
                p(r"number of failed transactions: {NUM}"),
                p(r"failed transactions: {NUM}"),
                p(r"(?i)failed\s+transactions?\D{0,5}{NUM}"),
            ],
        }
    }
}

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("could not read pattern file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("pattern file {} is not a valid metric -> [regex] map", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid {metric} pattern `{pattern}`")]
    Regex {
        metric: Metric,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("{metric} pattern `{pattern}` needs a capture group for the value")]
    NoCapture { metric: Metric, pattern: String },

    #[error("pattern list for {0} is empty")]
    Empty(Metric),
}

/// A successful lookup: which pattern fired and the value it parsed to.
#[derive(Debug, PartialEq)]
pub struct Hit<T> {
    pub pattern: usize,
    pub value: T,
}

/// Ordered regex lists, one per metric.
#[derive(Clone, Debug)]
pub struct PatternTable {
    patterns: HashMap<Metric, Vec<Regex>>,
}

impl PatternTable {
    pub fn builtin() -> Result<Self, PatternError> {
        Self::with_overrides(HashMap::new())
    }

    /// Built-in lists, with any metric named in `overrides` replaced wholesale.
    pub fn with_overrides(overrides: HashMap<Metric, Vec<String>>) -> Result<Self, PatternError> {
        let mut patterns = HashMap::new();
        for metric in Metric::iter() {
            let sources = match overrides.get(&metric) {
                Some(custom) => custom.clone(),
                None => metric.builtin_patterns(),
            };
            patterns.insert(metric, compile(metric, &sources)?);
        }
        Ok(Self { patterns })
    }

    /// Reads a JSON object such as `{"tps": ["tps: {NUM}"]}`. `{NUM}` expands
    /// to the shared number capture.
    pub fn from_json_file(path: &Path) -> Result<Self, PatternError> {
        let content = fs::read_to_string(path).map_err(|source| PatternError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: HashMap<Metric, Vec<String>> =
            serde_json::from_str(&content).map_err(|source| PatternError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        let overrides = raw
            .into_iter()
            .map(|(metric, list)| {
                let expanded = list.iter().map(|s| s.replace("{NUM}", NUM)).collect();
                (metric, expanded)
            })
            .collect();
        Self::with_overrides(overrides)
    }

    pub fn patterns(&self, metric: Metric) -> &[Regex] {
        self.patterns.get(&metric).map(Vec::as_slice).unwrap_or_default()
    }

    /// First pattern (in order) with a match in `text` whose capture parses
    /// as `T`; within a pattern the earliest parsable match wins. Captures
    /// that fail to parse are skipped, never returned as a miss.
    pub fn find<T: FromStr>(&self, metric: Metric, text: &str) -> Option<Hit<T>> {
        self.patterns(metric)
            .iter()
            .enumerate()
            .find_map(|(pattern, re)| {
                re.captures_iter(text)
                    .filter_map(|caps| parse_number::<T>(caps.get(1)?.as_str()))
                    .next()
                    .map(|value| Hit { pattern, value })
            })
    }

    fn value<T: FromStr>(&self, metric: Metric, text: &str) -> Option<T> {
        self.find(metric, text).map(|hit| hit.value)
    }

    pub fn extract_text(&self, text: &str) -> Metrics {
        Metrics {
            tps: self.value(Metric::Tps, text),
            avg_latency_ms: self.value(Metric::Latency, text),
            connection_time_ms: self.value(Metric::ConnectionTime, text),
            failed_transactions: self.value(Metric::Failed, text),
        }
    }
}

fn compile(metric: Metric, sources: &[String]) -> Result<Vec<Regex>, PatternError> {
    if sources.is_empty() {
        return Err(PatternError::Empty(metric));
    }
    sources
        .iter()
        .map(|pattern| {
            let re = Regex::new(pattern).map_err(|source| PatternError::Regex {
                metric,
                pattern: pattern.clone(),
                source,
            })?;
            if re.captures_len() < 2 {
                return Err(PatternError::NoCapture {
                    metric,
                    pattern: pattern.clone(),
                });
            }
            Ok(re)
        })
        .collect()
}

/// Parses `1,234.5` style numbers.
fn parse_number<T: FromStr>(raw: &str) -> Option<T> {
    raw.replace(',', "").trim().parse::<T>().ok()
}

/// Numbers scraped from one capture. Any field may be missing.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub tps: Option<f64>,
    pub avg_latency_ms: Option<f64>,
    pub connection_time_ms: Option<f64>,
    pub failed_transactions: Option<u64>,
}

impl Metrics {
    pub fn is_empty(&self) -> bool {
        *self == Metrics::default()
    }
}

fn read_capture(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("Could not read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Reads a finished capture and extracts what it can. Only an unreadable file
/// is an error; unmatched metrics come back as `None`.
pub fn extract(table: &PatternTable, path: &Path) -> Result<Metrics> {
    Ok(table.extract_text(&read_capture(path)?))
}

/// The last `n` lines of a capture, for showing the operator what pgbench said
/// when no throughput could be found.
pub fn tail_lines(path: &Path, n: usize) -> Result<Vec<String>> {
    let content = read_capture(path)?;
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(n);
    Ok(lines[start..].iter().map(|l| l.to_string()).collect())
}

/// One `progress:` line from pgbench's `--progress` output.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProgressInterval {
    pub time_sec: f64,
    pub tps: f64,
    pub latency_ms: Option<f64>,
}

/// Identify lines like "progress: 5.0 s, 812.3 tps, lat 12.3 ms stddev 4.1".
pub fn parse_progress_intervals(text: &str) -> Vec<ProgressInterval> {
    let mut intervals = Vec::new();
    for line in text.lines() {
        let Some(rest) = line.trim_start().strip_prefix("progress:") else {
            continue;
        };
        let parts: Vec<_> = rest.split(',').map(str::trim).collect();
        if parts.len() < 2 {
            continue;
        }
        let time_sec = parts[0].trim_end_matches('s').trim().parse::<f64>();
        let tps = parts[1].trim_end_matches("tps").trim().parse::<f64>();
        let (Ok(time_sec), Ok(tps)) = (time_sec, tps) else {
            continue;
        };
        let latency_ms = parts
            .get(2)
            .and_then(|p| p.strip_prefix("lat"))
            .and_then(|p| p.split_whitespace().next())
            .and_then(|v| v.parse::<f64>().ok());

        intervals.push(ProgressInterval {
            time_sec,
            tps,
            latency_ms,
        });
    }
    intervals
}

pub fn progress_intervals(path: &Path) -> Result<Vec<ProgressInterval>> {
    Ok(parse_progress_intervals(&read_capture(path)?))
}
