// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dead-letter table operations.

use outpost_core::{DeadLetter, OutpostError};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::queries::outbox::{RECORD_COLUMNS, row_to_record, select_by_id, sql_limit};

fn row_to_dead_letter(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeadLetter> {
    Ok(DeadLetter {
        record: row_to_record(row)?,
        dead_at: row.get(11)?,
    })
}

/// Move a record out of the outbox into the dead-letter table.
///
/// Returns `None` if the id is not in the outbox.
pub async fn move_to_dead_letter(
    db: &Database,
    id: &str,
    now: i64,
) -> Result<Option<DeadLetter>, OutpostError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<DeadLetter>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let Some(record) = select_by_id(&tx, "outbox", &id)? else {
                return Ok(None);
            };

            tx.execute(
                &format!(
                    "INSERT OR REPLACE INTO outbox_dead_letter ({RECORD_COLUMNS}, dead_at)
                     SELECT {RECORD_COLUMNS}, ?1 FROM outbox WHERE id = ?2"
                ),
                params![now, id],
            )?;
            tx.execute("DELETE FROM outbox WHERE id = ?1", params![id])?;
            tx.commit()?;

            Ok(Some(DeadLetter {
                record,
                dead_at: now,
            }))
        })
        .await
        .map_err(map_tr_err)
}

/// Up to `limit` dead letters, oldest first.
pub async fn list(db: &Database, limit: usize) -> Result<Vec<DeadLetter>, OutpostError> {
    let limit = sql_limit(limit);
    db.connection()
        .call(move |conn| -> Result<Vec<DeadLetter>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RECORD_COLUMNS}, dead_at FROM outbox_dead_letter
                 ORDER BY dead_at ASC, rowid ASC
                 LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![limit], row_to_dead_letter)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Remove a dead letter and return it.
pub async fn take(db: &Database, id: &str) -> Result<Option<DeadLetter>, OutpostError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<DeadLetter>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let letter = tx
                .query_row(
                    &format!(
                        "SELECT {RECORD_COLUMNS}, dead_at FROM outbox_dead_letter WHERE id = ?1"
                    ),
                    params![id],
                    row_to_dead_letter,
                )
                .optional()?;
            if letter.is_some() {
                tx.execute("DELETE FROM outbox_dead_letter WHERE id = ?1", params![id])?;
            }
            tx.commit()?;
            Ok(letter)
        })
        .await
        .map_err(map_tr_err)
}

/// Number of dead letters.
pub async fn count(db: &Database) -> Result<u64, OutpostError> {
    db.connection()
        .call(|conn| -> Result<u64, rusqlite::Error> {
            conn.query_row("SELECT COUNT(*) FROM outbox_dead_letter", [], |row| {
                row.get(0)
            })
        })
        .await
        .map_err(map_tr_err)
}
