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
use sysinfo::System;

/// Snapshot of the machine driving the battery. Recorded so results from
/// different boxes are not compared blindly.
#[derive(Clone, Debug, Serialize)]
pub struct HostInfo {
    pub host_name: Option<String>,
    pub os: Option<String>,
    pub cpu_count: usize,
    pub total_memory: String,
}

impl HostInfo {
    pub fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_all();
        sys.refresh_memory();
        let os = match (System::name(), System::os_version()) {
            (Some(name), Some(version)) => Some(format!("{name} {version}")),
            (name, _) => name,
        };
        Self {
            host_name: System::host_name(),
            os,
            cpu_count: sys.cpus().len(),
            total_memory: format_bytes(sys.total_memory()),
        }
    }
}

/// Convert a byte count into a human-friendly string (e.g. 12345678 -> "11.77MB").
pub fn format_bytes(bytes: u64) -> String {
    const GB: u64 = 1024 * 1024 * 1024;
    const MB: u64 = 1024 * 1024;
    if bytes >= GB {
        format!("{:.2}GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2}MB", bytes as f64 / MB as f64)
    } else {
        format!("{}B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_bytes() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(12345678), "11.77MB");
        assert_eq!(format_bytes(16 * 1024 * 1024 * 1024), "16.00GB");
    }

    #[test]
    fn collects_cpus_and_memory() {
        let host = HostInfo::collect();
        assert!(host.cpu_count > 0);
        assert!(host.total_memory.ends_with('B'));
    }
}
