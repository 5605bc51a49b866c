// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. The [`Database`] handle IS the single writer: query modules accept
//! `&Database` and run their statements inside `connection().call()`, so a
//! dedupe merge can never interleave with another statement.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;
use std::time::Duration;

use outpost_core::OutpostError;
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::migrations;

/// How long SQLite waits on a lock held by another process before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the outbox database.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at `path` in WAL mode and run migrations.
    pub async fn open(path: &str) -> Result<Self, OutpostError> {
        Self::open_with(path, true).await
    }

    /// Open the database, choosing the journal mode explicitly.
    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, OutpostError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(OutpostError::storage)?;
            }
        }

        let conn = Connection::open(path)
            .await
            .map_err(OutpostError::storage)?;

        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            if wal_mode {
                let _mode: String =
                    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            }
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.pragma_update(None, "foreign_keys", true)?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| -> Result<(), refinery::Error> { migrations::run_migrations(conn) })
            .await
            .map_err(|e| OutpostError::storage(format!("migration failed: {e}")))?;

        debug!(path, wal_mode, "outbox database opened");
        Ok(Self { conn })
    }

    /// The single writer connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Cheap liveness query.
    pub async fn ping(&self) -> Result<(), OutpostError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.query_row("SELECT 1", [], |_| Ok(()))
            })
            .await
            .map_err(map_tr_err)
    }

    /// Fold the WAL back into the main database file.
    pub async fn checkpoint(&self) -> Result<(), OutpostError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoint and close the connection.
    pub async fn close(self) -> Result<(), OutpostError> {
        self.checkpoint().await?;
        self.conn.close().await.map_err(OutpostError::storage)?;
        debug!("outbox database closed");
        Ok(())
    }
}

/// Convert a tokio-rusqlite error into `OutpostError::Storage`.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> OutpostError {
    OutpostError::Storage {
        source: Box::new(e),
    }
}
