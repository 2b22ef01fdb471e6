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

/// One load scenario of the battery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TestProfile {
    pub name: &'static str,
    pub clients: u32,
    pub jobs: u32,
    pub description: &'static str,
}

/// The fixed battery, run strictly in this order.
pub const BATTERY: [TestProfile; 4] = [
    TestProfile {
        name: "Light Load",
        clients: 5,
        jobs: 2,
        description: "Light concurrent usage",
    },
    TestProfile {
        name: "Medium Load",
        clients: 20,
        jobs: 4,
        description: "Typical application traffic",
    },
    TestProfile {
        name: "Heavy Load",
        clients: 50,
        jobs: 8,
        description: "Peak traffic",
    },
    TestProfile {
        name: "Stress Test",
        clients: 100,
        jobs: 4,
        description: "Connection saturation",
    },
];

impl TestProfile {
    /// File name of the raw pgbench capture for this profile, e.g.
    /// `"Stress Test"` -> `stress_test.txt`.
    pub fn output_file_name(&self) -> String {
        let stem: String = self
            .name
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!("{stem}.txt")
    }
}
