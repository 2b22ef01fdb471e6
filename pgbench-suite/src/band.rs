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

use serde::Serialize;
use strum::{Display, EnumIter};
use thiserror::Error;

/// Qualitative label for a run's throughput.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Display, EnumIter, Serialize)]
pub enum PerformanceBand {
    #[strum(serialize = "Very Poor")]
    VeryPoor,
    Poor,
    Fair,
    Good,
    Excellent,
}

#[derive(Debug, Error, PartialEq)]
#[error("invalid tps value {0}: must be a finite, non-negative number")]
pub struct InvalidTps(pub f64);

/// Lower bounds (exclusive) of each band, best band first.
const THRESHOLDS: [(f64, PerformanceBand); 4] = [
    (1000.0, PerformanceBand::Excellent),
    (500.0, PerformanceBand::Good),
    (200.0, PerformanceBand::Fair),
    (50.0, PerformanceBand::Poor),
];

pub fn classify(tps: f64) -> Result<PerformanceBand, InvalidTps> {
    if !tps.is_finite() || tps < 0.0 {
        return Err(InvalidTps(tps));
    }
    Ok(THRESHOLDS
        .iter()
        .find(|(floor, _)| tps > *floor)
        .map(|(_, band)| *band)
        .unwrap_or(PerformanceBand::VeryPoor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    #[rstest]
    #[case(1500.0, PerformanceBand::Excellent)]
    #[case(1000.0, PerformanceBand::Good)]
    #[case(1000.000001, PerformanceBand::Excellent)]
    #[case(600.0, PerformanceBand::Good)]
    #[case(500.0, PerformanceBand::Fair)]
    #[case(250.0, PerformanceBand::Fair)]
    #[case(200.0, PerformanceBand::Poor)]
    #[case(180.0, PerformanceBand::Poor)]
    #[case(75.0, PerformanceBand::Poor)]
    #[case(50.0, PerformanceBand::VeryPoor)]
    #[case(10.0, PerformanceBand::VeryPoor)]
    #[case(0.0, PerformanceBand::VeryPoor)]
    fn classifies_by_strict_thresholds(#[case] tps: f64, #[case] expected: PerformanceBand) {
        assert_eq!(classify(tps), Ok(expected));
    }

    #[rstest]
    #[case(-0.5)]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    fn rejects_invalid_input(#[case] tps: f64) {
        assert!(classify(tps).is_err());
    }

    #[test]
    fn labels() {
        let labels: Vec<String> = PerformanceBand::iter().map(|b| b.to_string()).collect();
        assert_eq!(labels, ["Very Poor", "Poor", "Fair", "Good", "Excellent"]);
    }
}
