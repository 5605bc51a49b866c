// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbox table operations.

use std::str::FromStr;

use outpost_core::{Filter, Mutation, MutationParts, Operation, OutpostError, QueuedMutation};
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row, params};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::database::{Database, map_tr_err};

pub(crate) const RECORD_COLUMNS: &str = "id, dedupe_key, op, target, payload, filters, options,
     created_at, updated_at, attempt_count, last_error";

/// A record flattened into the text columns SQLite stores.
#[derive(Debug, Clone)]
pub(crate) struct StoredRecord {
    pub id: String,
    pub dedupe_key: String,
    pub op: String,
    pub target: String,
    pub payload: Option<String>,
    pub filters: Option<String>,
    pub options: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub attempt_count: u32,
    pub last_error: Option<String>,
}

impl StoredRecord {
    pub fn encode(record: &QueuedMutation) -> Result<Self, OutpostError> {
        let parts = record.mutation.to_parts();
        Ok(Self {
            id: record.id.clone(),
            dedupe_key: record.dedupe_key.clone(),
            op: parts.op.to_string(),
            target: parts.target,
            payload: parts.payload.as_ref().map(to_json).transpose()?,
            filters: parts.filters.as_ref().map(to_json).transpose()?,
            options: parts
                .options
                .filter(|o| !o.is_empty())
                .as_ref()
                .map(to_json)
                .transpose()?,
            created_at: record.created_at,
            updated_at: record.updated_at,
            attempt_count: record.attempt_count,
            last_error: record.last_error.clone(),
        })
    }

    /// Insert into `table`, replacing any row with the same id.
    pub fn insert_into(&self, conn: &rusqlite::Connection, table: &str) -> rusqlite::Result<()> {
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {table} ({RECORD_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params![
                self.id,
                self.dedupe_key,
                self.op,
                self.target,
                self.payload,
                self.filters,
                self.options,
                self.created_at,
                self.updated_at,
                self.attempt_count,
                self.last_error,
            ],
        )?;
        Ok(())
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, OutpostError> {
    serde_json::to_string(value).map_err(OutpostError::storage)
}

fn corrupt(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| serde_json::from_str(&t))
        .transpose()
        .map_err(|e| corrupt(idx, e))
}

/// Decode a row selected with [`RECORD_COLUMNS`].
///
/// A row whose columns break the operation contract is reported as a
/// conversion failure, which surfaces as a storage error.
pub(crate) fn row_to_record(row: &Row<'_>) -> rusqlite::Result<QueuedMutation> {
    let op_text: String = row.get(2)?;
    let op = Operation::from_str(&op_text).map_err(|e| corrupt(2, e))?;
    let parts = MutationParts {
        op,
        target: row.get(3)?,
        payload: json_column::<Value>(row, 4)?,
        filters: json_column::<Vec<Filter>>(row, 5)?,
        options: json_column::<Map<String, Value>>(row, 6)?,
    };
    let mutation = Mutation::from_parts(parts).map_err(|e| corrupt(2, e))?;

    Ok(QueuedMutation {
        id: row.get(0)?,
        dedupe_key: row.get(1)?,
        mutation,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        attempt_count: row.get(9)?,
        last_error: row.get(10)?,
    })
}

pub(crate) fn select_by_id(
    conn: &rusqlite::Connection,
    table: &str,
    id: &str,
) -> rusqlite::Result<Option<QueuedMutation>> {
    conn.query_row(
        &format!("SELECT {RECORD_COLUMNS} FROM {table} WHERE id = ?1"),
        params![id],
        row_to_record,
    )
    .optional()
}

pub(crate) fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Insert or replace a record by id.
pub async fn put(db: &Database, record: &QueuedMutation) -> Result<(), OutpostError> {
    let stored = StoredRecord::encode(record)?;
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> { stored.insert_into(conn, "outbox") })
        .await
        .map_err(map_tr_err)
}

/// Get a record by id.
pub async fn get(db: &Database, id: &str) -> Result<Option<QueuedMutation>, OutpostError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| select_by_id(conn, "outbox", &id))
        .await
        .map_err(map_tr_err)
}

/// All records sharing a dedupe key, oldest first.
pub async fn find_by_dedupe_key(
    db: &Database,
    dedupe_key: &str,
) -> Result<Vec<QueuedMutation>, OutpostError> {
    let dedupe_key = dedupe_key.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<QueuedMutation>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM outbox
                 WHERE dedupe_key = ?1
                 ORDER BY updated_at ASC, rowid ASC"
            ))?;
            let rows = stmt.query_map(params![dedupe_key], row_to_record)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Delete a record, returning whether it existed.
///
/// Works on rows that no longer decode, so a corrupt record can still be
/// removed by id.
pub async fn delete(db: &Database, id: &str) -> Result<bool, OutpostError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute("DELETE FROM outbox WHERE id = ?1", params![id])?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete every record sharing `dedupe_key`. Returns the number removed.
pub async fn delete_by_dedupe_key(db: &Database, dedupe_key: &str) -> Result<u64, OutpostError> {
    let dedupe_key = dedupe_key.to_string();
    db.connection()
        .call(move |conn| -> Result<u64, rusqlite::Error> {
            let changed = conn.execute(
                "DELETE FROM outbox WHERE dedupe_key = ?1",
                params![dedupe_key],
            )?;
            Ok(changed as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// Up to `limit` records in replay order.
///
/// Ties on `updated_at` fall back to insertion order, so two intents
/// enqueued within the same millisecond still replay first-in first-out.
pub async fn list_ordered_by_updated_at(
    db: &Database,
    limit: usize,
) -> Result<Vec<QueuedMutation>, OutpostError> {
    let limit = sql_limit(limit);
    db.connection()
        .call(move |conn| -> Result<Vec<QueuedMutation>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM outbox
                 ORDER BY updated_at ASC, rowid ASC
                 LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![limit], row_to_record)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Number of pending records.
pub async fn count(db: &Database) -> Result<u64, OutpostError> {
    db.connection()
        .call(|conn| -> Result<u64, rusqlite::Error> {
            conn.query_row("SELECT COUNT(*) FROM outbox", [], |row| row.get(0))
        })
        .await
        .map_err(map_tr_err)
}

/// Atomically replace every record sharing `record.dedupe_key` with `record`.
///
/// Lookup, delete, and insert share one transaction, so no reader can see
/// zero or two records for the key mid-merge. Returns the removed ids.
pub async fn replace_by_dedupe_key(
    db: &Database,
    record: &QueuedMutation,
) -> Result<Vec<String>, OutpostError> {
    let stored = StoredRecord::encode(record)?;
    db.connection()
        .call(move |conn| -> Result<Vec<String>, rusqlite::Error> {
            let tx = conn.transaction()?;

            let removed = {
                let mut stmt = tx.prepare("SELECT id FROM outbox WHERE dedupe_key = ?1")?;
                let ids = stmt.query_map(params![stored.dedupe_key], |row| row.get(0))?;
                ids.collect::<Result<Vec<String>, _>>()?
            };

            tx.execute(
                "DELETE FROM outbox WHERE dedupe_key = ?1",
                params![stored.dedupe_key],
            )?;
            stored.insert_into(&tx, "outbox")?;
            tx.commit()?;
            Ok(removed)
        })
        .await
        .map_err(map_tr_err)
}

/// Record a failed replay on `id`.
///
/// Bumps `attempt_count`, stores the message, and moves `updated_at` to
/// `now`. Returns the updated record, or `None` if it no longer exists.
pub async fn record_failure(
    db: &Database,
    id: &str,
    message: &str,
    now: i64,
) -> Result<Option<QueuedMutation>, OutpostError> {
    let id = id.to_string();
    let message = message.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<QueuedMutation>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE outbox
                 SET attempt_count = attempt_count + 1, last_error = ?1, updated_at = ?2
                 WHERE id = ?3",
                params![message, now, id],
            )?;
            let record = if changed == 0 {
                None
            } else {
                select_by_id(&tx, "outbox", &id)?
            };
            tx.commit()?;
            Ok(record)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn record(id: &str, key: &str, count: i64, updated_at: i64) -> QueuedMutation {
        QueuedMutation {
            id: id.to_string(),
            dedupe_key: key.to_string(),
            mutation: Mutation::upsert(
                "census_entries",
                json!({"mission_day": "2026-02-24", "point_id": "pt1", "count": count}),
            )
            .on_conflict("mission_day,point_id"),
            created_at: updated_at,
            updated_at,
            attempt_count: 0,
            last_error: None,
        }
    }

    #[tokio::test]
    async fn put_and_get_preserve_every_field() {
        let (db, _dir) = setup_db().await;
        let mut rec = record("a", "census_entries:2026-02-24|pt1", 5, 100);
        rec.attempt_count = 2;
        rec.last_error = Some("timeout".into());
        put(&db, &rec).await.unwrap();

        let fetched = get(&db, "a").await.unwrap().unwrap();
        assert_eq!(fetched, rec);
        assert!(get(&db, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_replaces_by_id() {
        let (db, _dir) = setup_db().await;
        put(&db, &record("a", "k", 1, 100)).await.unwrap();
        put(&db, &record("a", "k", 2, 200)).await.unwrap();

        assert_eq!(count(&db).await.unwrap(), 1);
        let fetched = get(&db, "a").await.unwrap().unwrap();
        assert_eq!(fetched.updated_at, 200);
    }

    #[tokio::test]
    async fn every_operation_survives_storage() {
        let (db, _dir) = setup_db().await;
        let mutations = [
            Mutation::insert("events", json!([{"kind": "arrival"}, {"kind": "departure"}])),
            Mutation::update("people", json!({"name": "Ana"}), vec![Filter::eq("id", "p1")]),
            Mutation::delete(
                "demands",
                vec![Filter::eq("id", 7), Filter::eq("point_id", json!(null))],
            ),
            Mutation::rpc("close_mission_day", json!({"day": "2026-02-24"})),
        ];
        for (i, mutation) in mutations.iter().enumerate() {
            let rec = QueuedMutation {
                mutation: mutation.clone(),
                ..record(&format!("r{i}"), &format!("k{i}"), 0, i as i64)
            };
            put(&db, &rec).await.unwrap();
        }

        let listed = list_ordered_by_updated_at(&db, 10).await.unwrap();
        let stored: Vec<Mutation> = listed.into_iter().map(|r| r.mutation).collect();
        assert_eq!(stored, mutations);
    }

    #[tokio::test]
    async fn replace_by_dedupe_key_collapses_duplicates() {
        let (db, _dir) = setup_db().await;
        // Simulate a race that left two records for one key.
        put(&db, &record("old-1", "k", 1, 100)).await.unwrap();
        put(&db, &record("old-2", "k", 2, 110)).await.unwrap();
        put(&db, &record("other", "other-key", 9, 120)).await.unwrap();

        let mut removed = replace_by_dedupe_key(&db, &record("new", "k", 3, 200))
            .await
            .unwrap();
        removed.sort();
        assert_eq!(removed, vec!["old-1".to_string(), "old-2".to_string()]);

        let same_key = find_by_dedupe_key(&db, "k").await.unwrap();
        assert_eq!(same_key.len(), 1);
        assert_eq!(same_key[0].id, "new");
        assert_eq!(count(&db).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn list_orders_by_updated_at_then_insertion() {
        let (db, _dir) = setup_db().await;
        put(&db, &record("late", "k1", 0, 300)).await.unwrap();
        put(&db, &record("early", "k2", 0, 100)).await.unwrap();
        put(&db, &record("tie-a", "k3", 0, 200)).await.unwrap();
        put(&db, &record("tie-b", "k4", 0, 200)).await.unwrap();

        let ids: Vec<String> = list_ordered_by_updated_at(&db, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, ["early", "tie-a", "tie-b", "late"]);

        let first_two = list_ordered_by_updated_at(&db, 2).await.unwrap();
        assert_eq!(first_two.len(), 2);
    }

    #[tokio::test]
    async fn record_failure_bumps_bookkeeping_only() {
        let (db, _dir) = setup_db().await;
        let rec = record("a", "k", 5, 100);
        put(&db, &rec).await.unwrap();

        let updated = record_failure(&db, "a", "permission denied", 500)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.attempt_count, 1);
        assert_eq!(updated.last_error.as_deref(), Some("permission denied"));
        assert_eq!(updated.updated_at, 500);
        assert_eq!(updated.created_at, rec.created_at);
        assert_eq!(updated.mutation, rec.mutation);

        let again = record_failure(&db, "a", "still denied", 600).await.unwrap().unwrap();
        assert_eq!(again.attempt_count, 2);

        assert!(record_failure(&db, "gone", "x", 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_is_noop_for_missing_id() {
        let (db, _dir) = setup_db().await;
        put(&db, &record("a", "k", 1, 1)).await.unwrap();
        assert!(!delete(&db, "missing").await.unwrap());
        assert!(delete(&db, "a").await.unwrap());
        assert_eq!(count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_by_dedupe_key_leaves_other_keys() {
        let (db, _dir) = setup_db().await;
        put(&db, &record("a", "k", 1, 1)).await.unwrap();
        put(&db, &record("b", "k", 2, 2)).await.unwrap();
        put(&db, &record("c", "other", 3, 3)).await.unwrap();

        assert_eq!(delete_by_dedupe_key(&db, "k").await.unwrap(), 2);
        assert_eq!(delete_by_dedupe_key(&db, "k").await.unwrap(), 0);
        assert_eq!(count(&db).await.unwrap(), 1);
        assert!(get(&db, "c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn corrupted_row_is_a_storage_error() {
        let (db, _dir) = setup_db().await;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO outbox (id, dedupe_key, op, target, payload, filters, options,
                                         created_at, updated_at)
                     VALUES ('bad', 'k', 'delete', 'people', NULL, 'not json', NULL, 1, 1)",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let result = list_ordered_by_updated_at(&db, 10).await;
        assert!(matches!(result, Err(OutpostError::Storage { .. })));
    }

    #[tokio::test]
    async fn contract_violating_row_is_a_storage_error() {
        let (db, _dir) = setup_db().await;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO outbox (id, dedupe_key, op, target, payload, filters, options,
                                         created_at, updated_at)
                     VALUES ('bad', 'k', 'update', 'people', '{\"a\":1}', NULL, NULL, 1, 1)",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        assert!(matches!(get(&db, "bad").await, Err(OutpostError::Storage { .. })));
        assert!(matches!(
            list_ordered_by_updated_at(&db, 10).await,
            Err(OutpostError::Storage { .. })
        ));

        // Removal never decodes the row.
        assert!(delete(&db, "bad").await.unwrap());
        assert!(list_ordered_by_updated_at(&db, 10).await.unwrap().is_empty());
    }
}
