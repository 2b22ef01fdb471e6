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

use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort the whole battery. Anything per-profile is recovered
/// locally and surfaced in the summary instead.
#[derive(Debug, Error)]
pub enum SuiteError {
    #[error("could not connect to postgres at {target}: {reason}")]
    Connectivity { target: String, reason: String },

    #[error("failed to launch `{}`", binary.display())]
    Launch {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
