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

use async_std::future::timeout;
use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, PgConnection};
use std::time::Duration;

use crate::cli::ConnectionConfig;
use crate::error::SuiteError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

impl ConnectionConfig {
    fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
    }
}

/// Runs a version probe with the same parameters pgbench will use, returning
/// the server's version string.
pub async fn check_connectivity(conn: &ConnectionConfig) -> Result<String, SuiteError> {
    let fail = |reason: String| SuiteError::Connectivity {
        target: conn.target(),
        reason,
    };

    let mut pg = timeout(
        CONNECT_TIMEOUT,
        PgConnection::connect_with(&conn.connect_options()),
    )
    .await
    .map_err(|_| fail(format!("timed out after {}s", CONNECT_TIMEOUT.as_secs())))?
    .map_err(|e| fail(e.to_string()))?;

    let version: String = sqlx::query_scalar("SELECT version()")
        .fetch_one(&mut pg)
        .await
        .map_err(|e| fail(e.to_string()))?;

    let _ = pg.close().await;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_std::task::block_on;

    #[test]
    fn unreachable_server_is_a_connectivity_error() {
        let conn = ConnectionConfig {
            host: "127.0.0.1".into(),
            port: 1,
            user: "postgres".into(),
            password: "postgres".into(),
            database: "testdb".into(),
        };
        match block_on(check_connectivity(&conn)) {
            Err(SuiteError::Connectivity { target, .. }) => {
                assert_eq!(target, "postgres@127.0.0.1:1/testdb");
            }
            other => panic!("expected connectivity error, got {other:?}"),
        }
    }
}
