// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory remote backend for deterministic testing.
//!
//! `MockBackend` implements `RemoteBackend` over a map of tables. Upserts
//! honour the `onConflict` target (default `id`), so replaying the same
//! intent twice leaves one row, while plain inserts reject a duplicate `id`
//! the way a primary key would.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use outpost_core::{
    Adapter, BackendError, Filter, HealthStatus, Operation, OutpostError, RemoteBackend,
};

type Row = Map<String, Value>;

/// One call received by the mock, successful or not.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub operation: Operation,
    pub target: String,
    /// Row payload, rpc params, or `null` for deletes.
    pub payload: Value,
    pub filters: Vec<Filter>,
}

/// A standing failure for calls against one table.
struct FailureRule {
    target: String,
    /// Only fail when a payload row or filter has this column value.
    matching: Option<(String, Value)>,
    error: BackendError,
}

impl FailureRule {
    fn applies(&self, call: &RecordedCall) -> bool {
        if call.target != self.target {
            return false;
        }
        let Some((column, value)) = &self.matching else {
            return true;
        };
        let in_payload = payload_rows(&call.payload)
            .iter()
            .any(|row| row.get(column) == Some(value));
        let in_filters = call.filters.iter().any(|f| match f {
            Filter::Eq { column: c, value: v } => c == column && v == value,
        });
        in_payload || in_filters
    }
}

fn payload_rows(payload: &Value) -> Vec<Row> {
    match payload {
        Value::Object(row) => vec![row.clone()],
        Value::Array(rows) => rows.iter().filter_map(|r| r.as_object().cloned()).collect(),
        _ => Vec::new(),
    }
}

fn matches_filters(row: &Row, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| match filter {
        Filter::Eq { column, value } => row.get(column).unwrap_or(&Value::Null) == value,
    })
}

fn rows_value(rows: Vec<Row>) -> Value {
    Value::Array(rows.into_iter().map(Value::Object).collect())
}

/// A mock remote backend with in-memory tables.
pub struct MockBackend {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    calls: Mutex<Vec<RecordedCall>>,
    call_count: AtomicUsize,
    next_failures: Mutex<VecDeque<BackendError>>,
    rules: Mutex<Vec<FailureRule>>,
    rpc_responses: Mutex<HashMap<String, Value>>,
    delay: Mutex<Duration>,
    reachable: AtomicBool,
}

impl MockBackend {
    /// Create a reachable mock with empty tables.
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
            next_failures: Mutex::new(VecDeque::new()),
            rules: Mutex::new(Vec::new()),
            rpc_responses: Mutex::new(HashMap::new()),
            delay: Mutex::new(Duration::ZERO),
            reachable: AtomicBool::new(true),
        }
    }

    /// Fail the next call, whatever it is. Stacks in FIFO order.
    pub async fn fail_next(&self, error: BackendError) {
        self.next_failures.lock().await.push_back(error);
    }

    /// Fail every call against `target` until cleared.
    pub async fn fail_target(&self, target: &str, error: BackendError) {
        self.rules.lock().await.push(FailureRule {
            target: target.to_string(),
            matching: None,
            error,
        });
    }

    /// Fail calls against `target` that touch a row with `column = value`.
    pub async fn fail_target_where(
        &self,
        target: &str,
        column: &str,
        value: Value,
        error: BackendError,
    ) {
        self.rules.lock().await.push(FailureRule {
            target: target.to_string(),
            matching: Some((column.to_string(), value)),
            error,
        });
    }

    pub async fn clear_failures(&self) {
        self.next_failures.lock().await.clear();
        self.rules.lock().await.clear();
    }

    /// Sleep this long inside every call.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.lock().await = delay;
    }

    /// Controls what `health_check` reports.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub async fn set_rpc_response(&self, name: &str, response: Value) {
        self.rpc_responses
            .lock()
            .await
            .insert(name.to_string(), response);
    }

    /// Pre-populate a table.
    pub async fn seed(&self, table: &str, rows: Value) {
        self.tables
            .lock()
            .await
            .entry(table.to_string())
            .or_default()
            .extend(payload_rows(&rows));
    }

    /// Current rows of `table`, in insertion order.
    pub async fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .await
            .get(table)
            .map(|rows| rows.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    /// Every call received so far.
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Log the call, wait out the delay, and return any injected failure.
    async fn begin(&self, call: RecordedCall) -> Result<(), BackendError> {
        self.calls.lock().await.push(call.clone());
        self.call_count.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.next_failures.lock().await.pop_front() {
            return Err(error);
        }
        let rules = self.rules.lock().await;
        match rules.iter().find(|rule| rule.applies(&call)) {
            Some(rule) => Err(rule.error.clone()),
            None => Ok(()),
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for MockBackend {
    fn name(&self) -> &str {
        "mock-backend"
    }

    async fn health_check(&self) -> Result<HealthStatus, OutpostError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy("mock backend unreachable".into()))
        }
    }
}

#[async_trait]
impl RemoteBackend for MockBackend {
    async fn insert(
        &self,
        table: &str,
        payload: &Value,
        _options: &Map<String, Value>,
    ) -> Result<Value, BackendError> {
        self.begin(RecordedCall {
            operation: Operation::Insert,
            target: table.to_string(),
            payload: payload.clone(),
            filters: Vec::new(),
        })
        .await?;

        let new_rows = payload_rows(payload);
        let mut tables = self.tables.lock().await;
        let rows = tables.entry(table.to_string()).or_default();
        let duplicate = new_rows.iter().any(|new| {
            new.get("id")
                .is_some_and(|id| rows.iter().any(|row| row.get("id") == Some(id)))
        });
        if duplicate {
            return Err(BackendError::Api {
                status: 409,
                code: Some("23505".into()),
                message: format!("duplicate key value violates unique constraint \"{table}_pkey\""),
                details: None,
                hint: None,
            });
        }
        rows.extend(new_rows.iter().cloned());
        Ok(rows_value(new_rows))
    }

    async fn upsert(
        &self,
        table: &str,
        payload: &Value,
        options: &Map<String, Value>,
    ) -> Result<Value, BackendError> {
        self.begin(RecordedCall {
            operation: Operation::Upsert,
            target: table.to_string(),
            payload: payload.clone(),
            filters: Vec::new(),
        })
        .await?;

        let conflict: Vec<String> = options
            .get("onConflict")
            .and_then(Value::as_str)
            .unwrap_or("id")
            .split(',')
            .map(|c| c.trim().to_string())
            .collect();
        let ignore_duplicates = options
            .get("ignoreDuplicates")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let mut tables = self.tables.lock().await;
        let rows = tables.entry(table.to_string()).or_default();
        let mut written = Vec::new();
        for new in payload_rows(payload) {
            let existing = rows.iter_mut().find(|row| {
                conflict
                    .iter()
                    .all(|col| new.get(col).is_some() && row.get(col) == new.get(col))
            });
            match existing {
                Some(_) if ignore_duplicates => {}
                Some(row) => {
                    row.extend(new.clone());
                    written.push(row.clone());
                }
                None => {
                    rows.push(new.clone());
                    written.push(new);
                }
            }
        }
        Ok(rows_value(written))
    }

    async fn update(
        &self,
        table: &str,
        payload: &Value,
        filters: &[Filter],
    ) -> Result<Value, BackendError> {
        self.begin(RecordedCall {
            operation: Operation::Update,
            target: table.to_string(),
            payload: payload.clone(),
            filters: filters.to_vec(),
        })
        .await?;

        let changes = payload.as_object().cloned().unwrap_or_default();
        let mut tables = self.tables.lock().await;
        let rows = tables.entry(table.to_string()).or_default();
        let mut updated = Vec::new();
        for row in rows.iter_mut().filter(|row| matches_filters(row, filters)) {
            row.extend(changes.clone());
            updated.push(row.clone());
        }
        Ok(rows_value(updated))
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<Value, BackendError> {
        self.begin(RecordedCall {
            operation: Operation::Delete,
            target: table.to_string(),
            payload: Value::Null,
            filters: filters.to_vec(),
        })
        .await?;

        let mut tables = self.tables.lock().await;
        let rows = tables.entry(table.to_string()).or_default();
        let (removed, kept): (Vec<Row>, Vec<Row>) = rows
            .drain(..)
            .partition(|row| matches_filters(row, filters));
        *rows = kept;
        Ok(rows_value(removed))
    }

    async fn rpc(&self, name: &str, params: &Value) -> Result<Value, BackendError> {
        self.begin(RecordedCall {
            operation: Operation::Rpc,
            target: name.to_string(),
            payload: params.clone(),
            filters: Vec::new(),
        })
        .await?;

        Ok(self
            .rpc_responses
            .lock()
            .await
            .get(name)
            .cloned()
            .unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conflict(cols: &str) -> Map<String, Value> {
        Map::from_iter([("onConflict".to_string(), json!(cols))])
    }

    #[tokio::test]
    async fn upsert_merges_on_conflict_target() {
        let backend = MockBackend::new();
        let target = conflict("mission_day,point_id");
        backend
            .upsert(
                "census_entries",
                &json!({"mission_day": "d", "point_id": "pt1", "count": 3}),
                &target,
            )
            .await
            .unwrap();
        backend
            .upsert(
                "census_entries",
                &json!({"mission_day": "d", "point_id": "pt1", "count": 5}),
                &target,
            )
            .await
            .unwrap();
        backend
            .upsert(
                "census_entries",
                &json!({"mission_day": "d", "point_id": "pt2", "count": 1}),
                &target,
            )
            .await
            .unwrap();

        let rows = backend.rows("census_entries").await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["count"], json!(5));
    }

    #[tokio::test]
    async fn ignore_duplicates_keeps_existing_row() {
        let backend = MockBackend::new();
        backend.seed("people", json!([{"id": "p1", "name": "Ana"}])).await;
        let mut options = conflict("id");
        options.insert("ignoreDuplicates".into(), json!(true));
        backend
            .upsert("people", &json!({"id": "p1", "name": "Other"}), &options)
            .await
            .unwrap();
        assert_eq!(backend.rows("people").await[0]["name"], json!("Ana"));
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_id() {
        let backend = MockBackend::new();
        let row = json!({"id": "p1"});
        backend.insert("people", &row, &Map::new()).await.unwrap();
        let err = backend.insert("people", &row, &Map::new()).await.unwrap_err();
        assert!(matches!(err, BackendError::Api { status: 409, .. }));
        assert_eq!(backend.rows("people").await.len(), 1);
    }

    #[tokio::test]
    async fn update_and_delete_respect_filters() {
        let backend = MockBackend::new();
        backend
            .seed(
                "demands",
                json!([{"id": 1, "status": "open"}, {"id": 2, "status": "open"}]),
            )
            .await;

        let updated = backend
            .update("demands", &json!({"status": "closed"}), &[Filter::eq("id", 2)])
            .await
            .unwrap();
        assert_eq!(updated, json!([{"id": 2, "status": "closed"}]));

        backend
            .delete("demands", &[Filter::eq("status", "open")])
            .await
            .unwrap();
        assert_eq!(
            backend.rows("demands").await,
            vec![json!({"id": 2, "status": "closed"})]
        );
    }

    #[tokio::test]
    async fn injected_failures_are_recorded_calls() {
        let backend = MockBackend::new();
        backend.fail_next(BackendError::transport("reset")).await;
        backend
            .fail_target_where("people", "id", json!("bad"), BackendError::api(400, "no"))
            .await;

        assert!(backend.rpc("ping", &json!({})).await.is_err());
        assert!(backend.rpc("ping", &json!({})).await.is_ok());
        assert!(
            backend
                .upsert("people", &json!({"id": "bad"}), &Map::new())
                .await
                .is_err()
        );
        assert!(
            backend
                .upsert("people", &json!({"id": "good"}), &Map::new())
                .await
                .is_ok()
        );
        assert_eq!(backend.call_count(), 4);
        assert_eq!(backend.rows("people").await, vec![json!({"id": "good"})]);

        backend.clear_failures().await;
        assert!(
            backend
                .upsert("people", &json!({"id": "bad"}), &Map::new())
                .await
                .is_ok()
        );
    }
}
