// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mutation intents, queued records, and the results returned to callers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

use crate::error::{BackendError, OutpostError};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Kind of mutation, as persisted in the `op` column.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Insert,
    Upsert,
    Update,
    Delete,
    Rpc,
}

/// A row-matching constraint for update and delete.
///
/// Only equality exists today; new comparison kinds become new variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    Eq { column: String, value: Value },
}

impl Filter {
    /// Equality constraint on `column`.
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            column: column.into(),
            value: value.into(),
        }
    }
}

/// A data mutation against the remote backend.
///
/// Each operation carries exactly the fields it needs, so a queued record can
/// never hold filters for an insert or a payload for a delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    Insert {
        table: String,
        payload: Value,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        options: Map<String, Value>,
    },
    Upsert {
        table: String,
        payload: Value,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        options: Map<String, Value>,
    },
    Update {
        table: String,
        payload: Value,
        filters: Vec<Filter>,
    },
    Delete {
        table: String,
        filters: Vec<Filter>,
    },
    Rpc {
        name: String,
        #[serde(default = "empty_object")]
        params: Value,
    },
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Flattened column view of a [`Mutation`], used by storage adapters.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationParts {
    pub op: Operation,
    pub target: String,
    pub payload: Option<Value>,
    pub filters: Option<Vec<Filter>>,
    pub options: Option<Map<String, Value>>,
}

impl Mutation {
    pub fn insert(table: impl Into<String>, payload: Value) -> Self {
        Self::Insert {
            table: table.into(),
            payload,
            options: Map::new(),
        }
    }

    pub fn upsert(table: impl Into<String>, payload: Value) -> Self {
        Self::Upsert {
            table: table.into(),
            payload,
            options: Map::new(),
        }
    }

    pub fn update(table: impl Into<String>, payload: Value, filters: Vec<Filter>) -> Self {
        Self::Update {
            table: table.into(),
            payload,
            filters,
        }
    }

    pub fn delete(table: impl Into<String>, filters: Vec<Filter>) -> Self {
        Self::Delete {
            table: table.into(),
            filters,
        }
    }

    pub fn rpc(name: impl Into<String>, params: Value) -> Self {
        Self::Rpc {
            name: name.into(),
            params,
        }
    }

    /// Adds a pass-through option (e.g. `onConflict`) to an insert or upsert.
    ///
    /// Other operations carry no options; the call is a no-op for them.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Self::Insert { options, .. } | Self::Upsert { options, .. } = &mut self {
            options.insert(key.into(), value.into());
        }
        self
    }

    /// Shorthand for the upsert conflict target, e.g. `"mission_day,point_id"`.
    pub fn on_conflict(self, columns: impl Into<String>) -> Self {
        self.with_option("onConflict", columns.into())
    }

    pub fn operation(&self) -> Operation {
        match self {
            Self::Insert { .. } => Operation::Insert,
            Self::Upsert { .. } => Operation::Upsert,
            Self::Update { .. } => Operation::Update,
            Self::Delete { .. } => Operation::Delete,
            Self::Rpc { .. } => Operation::Rpc,
        }
    }

    /// Table name, or procedure name for `Rpc`.
    pub fn target(&self) -> &str {
        match self {
            Self::Insert { table, .. }
            | Self::Upsert { table, .. }
            | Self::Update { table, .. }
            | Self::Delete { table, .. } => table,
            Self::Rpc { name, .. } => name,
        }
    }

    /// Checks the per-operation field contract.
    pub fn validate(&self) -> Result<(), OutpostError> {
        if self.target().trim().is_empty() {
            return Err(OutpostError::InvalidMutation(format!(
                "{} target must not be empty",
                self.operation()
            )));
        }
        match self {
            Self::Insert { payload, .. } | Self::Upsert { payload, .. } => {
                check_row_payload(self.operation(), payload, true)
            }
            Self::Update {
                payload, filters, ..
            } => {
                check_row_payload(Operation::Update, payload, false)?;
                check_filters(Operation::Update, filters)
            }
            Self::Delete { filters, .. } => check_filters(Operation::Delete, filters),
            Self::Rpc { params, .. } => {
                if params.is_object() {
                    Ok(())
                } else {
                    Err(OutpostError::InvalidMutation(
                        "rpc params must be a JSON object".into(),
                    ))
                }
            }
        }
    }

    /// Splits the mutation into its storable columns.
    pub fn to_parts(&self) -> MutationParts {
        let op = self.operation();
        let target = self.target().to_string();
        match self {
            Self::Insert {
                payload, options, ..
            }
            | Self::Upsert {
                payload, options, ..
            } => MutationParts {
                op,
                target,
                payload: Some(payload.clone()),
                filters: None,
                options: Some(options.clone()),
            },
            Self::Update {
                payload, filters, ..
            } => MutationParts {
                op,
                target,
                payload: Some(payload.clone()),
                filters: Some(filters.clone()),
                options: None,
            },
            Self::Delete { filters, .. } => MutationParts {
                op,
                target,
                payload: None,
                filters: Some(filters.clone()),
                options: None,
            },
            Self::Rpc { params, .. } => MutationParts {
                op,
                target,
                payload: Some(params.clone()),
                filters: None,
                options: None,
            },
        }
    }

    /// Rebuilds a mutation from stored columns, rejecting combinations the
    /// operation does not allow.
    pub fn from_parts(parts: MutationParts) -> Result<Self, OutpostError> {
        let MutationParts {
            op,
            target,
            payload,
            filters,
            options,
        } = parts;

        let missing = |field: &str| {
            OutpostError::InvalidMutation(format!("{op} on `{target}` is missing {field}"))
        };
        let unexpected = |field: &str| {
            OutpostError::InvalidMutation(format!("{op} on `{target}` must not carry {field}"))
        };

        let mutation = match op {
            Operation::Insert | Operation::Upsert => {
                if filters.is_some() {
                    return Err(unexpected("filters"));
                }
                let payload = payload.ok_or_else(|| missing("payload"))?;
                let options = options.unwrap_or_default();
                if op == Operation::Insert {
                    Self::Insert {
                        table: target,
                        payload,
                        options,
                    }
                } else {
                    Self::Upsert {
                        table: target,
                        payload,
                        options,
                    }
                }
            }
            Operation::Update => {
                if options.as_ref().is_some_and(|o| !o.is_empty()) {
                    return Err(unexpected("options"));
                }
                Self::Update {
                    payload: payload.ok_or_else(|| missing("payload"))?,
                    filters: filters.ok_or_else(|| missing("filters"))?,
                    table: target,
                }
            }
            Operation::Delete => {
                if payload.is_some() {
                    return Err(unexpected("payload"));
                }
                if options.as_ref().is_some_and(|o| !o.is_empty()) {
                    return Err(unexpected("options"));
                }
                Self::Delete {
                    filters: filters.ok_or_else(|| missing("filters"))?,
                    table: target,
                }
            }
            Operation::Rpc => {
                if filters.is_some() {
                    return Err(unexpected("filters"));
                }
                Self::Rpc {
                    name: target,
                    params: payload.unwrap_or_else(empty_object),
                }
            }
        };
        Ok(mutation)
    }
}

fn check_row_payload(op: Operation, payload: &Value, allow_array: bool) -> Result<(), OutpostError> {
    match payload {
        Value::Object(_) => Ok(()),
        Value::Array(rows) if allow_array && !rows.is_empty() && rows.iter().all(Value::is_object) => {
            Ok(())
        }
        _ => Err(OutpostError::InvalidMutation(format!(
            "{op} payload must be a JSON object{}",
            if allow_array {
                " or a non-empty array of objects"
            } else {
                ""
            }
        ))),
    }
}

fn check_filters(op: Operation, filters: &[Filter]) -> Result<(), OutpostError> {
    if filters.is_empty() {
        // An unfiltered update/delete would touch every row.
        return Err(OutpostError::InvalidMutation(format!(
            "{op} requires at least one filter"
        )));
    }
    Ok(())
}

/// What a caller hands to the write dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationIntent {
    /// Logical target used to collapse repeated edits, see `dedupe_key_for`.
    pub dedupe_key: String,
    #[serde(flatten)]
    pub mutation: Mutation,
}

impl MutationIntent {
    pub fn new(dedupe_key: impl Into<String>, mutation: Mutation) -> Self {
        Self {
            dedupe_key: dedupe_key.into(),
            mutation,
        }
    }
}

/// A pending mutation persisted in the outbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMutation {
    pub id: String,
    pub dedupe_key: String,
    #[serde(flatten)]
    pub mutation: Mutation,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    /// Milliseconds since the Unix epoch; replay order key.
    pub updated_at: i64,
    pub attempt_count: u32,
    pub last_error: Option<String>,
}

/// A record removed from the outbox after too many failed replays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    #[serde(flatten)]
    pub record: QueuedMutation,
    pub dead_at: i64,
}

/// Result of a dispatched write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// The backend accepted the mutation immediately.
    Applied { data: Value },
    /// The mutation was stored in the outbox for a later flush.
    ///
    /// `error` is set when an immediate attempt was made and failed.
    Queued {
        id: String,
        error: Option<BackendError>,
    },
}

impl WriteOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Applied { data } => Some(data),
            Self::Queued { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&BackendError> {
        match self {
            Self::Applied { .. } => None,
            Self::Queued { error, .. } => error.as_ref(),
        }
    }
}

/// The record that stopped a flush pass.
#[derive(Debug, Clone, PartialEq)]
pub struct FlushFailure {
    pub id: String,
    pub dedupe_key: String,
    pub error: BackendError,
    /// Attempt count after this failure was recorded.
    pub attempt_count: u32,
    /// Whether the record was moved to the dead-letter table.
    pub dead_lettered: bool,
}

/// Outcome of one flush pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushReport {
    /// Records applied and removed during the pass.
    pub flushed: usize,
    pub failure: Option<FlushFailure>,
}

impl FlushReport {
    pub fn is_clean(&self) -> bool {
        self.failure.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parts_reject_filters_on_insert() {
        let parts = MutationParts {
            op: Operation::Insert,
            target: "census_entries".into(),
            payload: Some(json!({"count": 1})),
            filters: Some(vec![Filter::eq("id", 1)]),
            options: None,
        };
        assert!(matches!(
            Mutation::from_parts(parts),
            Err(OutpostError::InvalidMutation(_))
        ));
    }

    #[test]
    fn parts_reject_payload_on_delete() {
        let parts = MutationParts {
            op: Operation::Delete,
            target: "people".into(),
            payload: Some(json!({})),
            filters: Some(vec![Filter::eq("id", "p1")]),
            options: None,
        };
        assert!(Mutation::from_parts(parts).is_err());
    }

    #[test]
    fn parts_require_filters_on_update() {
        let parts = MutationParts {
            op: Operation::Update,
            target: "people".into(),
            payload: Some(json!({"name": "x"})),
            filters: None,
            options: None,
        };
        assert!(Mutation::from_parts(parts).is_err());
    }

    #[test]
    fn rpc_params_default_to_empty_object() {
        let parts = MutationParts {
            op: Operation::Rpc,
            target: "close_day".into(),
            payload: None,
            filters: None,
            options: None,
        };
        let mutation = Mutation::from_parts(parts).unwrap();
        assert_eq!(mutation, Mutation::rpc("close_day", json!({})));
    }

    #[test]
    fn on_conflict_only_applies_to_row_writes() {
        let upsert = Mutation::upsert("census_entries", json!({"count": 5}))
            .on_conflict("mission_day,point_id");
        match upsert {
            Mutation::Upsert { options, .. } => {
                assert_eq!(options["onConflict"], json!("mission_day,point_id"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let delete = Mutation::delete("people", vec![Filter::eq("id", 1)]).on_conflict("id");
        assert_eq!(delete, Mutation::delete("people", vec![Filter::eq("id", 1)]));
    }

    #[test]
    fn validate_rejects_unfiltered_delete() {
        let err = Mutation::delete("people", vec![]).validate().unwrap_err();
        assert!(err.to_string().contains("at least one filter"));
    }

    #[test]
    fn validate_rejects_scalar_payload() {
        assert!(Mutation::insert("events", json!(3)).validate().is_err());
        assert!(Mutation::insert("events", json!([])).validate().is_err());
        assert!(Mutation::insert("events", json!([{"a": 1}])).validate().is_ok());
        assert!(Mutation::update("events", json!([{"a": 1}]), vec![Filter::eq("id", 1)])
            .validate()
            .is_err());
    }

    #[test]
    fn validate_rejects_blank_target() {
        assert!(Mutation::rpc("  ", json!({})).validate().is_err());
    }

    #[test]
    fn intent_json_uses_op_tag() {
        let intent = MutationIntent::new(
            "census_entries:2026-02-24|pt1",
            Mutation::upsert("census_entries", json!({"count": 8})),
        );
        let value = serde_json::to_value(&intent).unwrap();
        assert_eq!(value["op"], json!("upsert"));
        assert_eq!(value["table"], json!("census_entries"));
        assert_eq!(value["dedupe_key"], json!("census_entries:2026-02-24|pt1"));
        assert!(value.get("options").is_none());

        let parsed: MutationIntent = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, intent);
    }

    #[test]
    fn write_outcome_accessors() {
        let applied = WriteOutcome::Applied { data: json!([1]) };
        assert!(!applied.is_queued());
        assert_eq!(applied.data(), Some(&json!([1])));
        assert!(applied.error().is_none());

        let queued = WriteOutcome::Queued {
            id: "a".into(),
            error: Some(BackendError::transport("offline")),
        };
        assert!(queued.is_queued());
        assert!(queued.data().is_none());
        assert!(queued.error().unwrap().is_transient());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_mutation() -> impl Strategy<Value = Mutation> {
            let table = "[a-z_]{1,12}";
            let row = prop::collection::btree_map("[a-z]{1,6}", any::<i64>(), 1..4).prop_map(|m| {
                Value::Object(m.into_iter().map(|(k, v)| (k, json!(v))).collect())
            });
            let filters = prop::collection::vec(
                ("[a-z]{1,6}", any::<i64>()).prop_map(|(c, v)| Filter::eq(c, v)),
                1..3,
            );
            prop_oneof![
                (table, row.clone()).prop_map(|(t, p)| Mutation::insert(t, p)),
                (table, row.clone(), "[a-z,]{1,10}")
                    .prop_map(|(t, p, c)| Mutation::upsert(t, p).on_conflict(c)),
                (table, row.clone(), filters.clone())
                    .prop_map(|(t, p, f)| Mutation::update(t, p, f)),
                (table, filters).prop_map(|(t, f)| Mutation::delete(t, f)),
                (table, row).prop_map(|(t, p)| Mutation::rpc(t, p)),
            ]
        }

        proptest! {
            #[test]
            fn stored_columns_rebuild_the_same_mutation(mutation in arb_mutation()) {
                let rebuilt = Mutation::from_parts(mutation.to_parts()).unwrap();
                prop_assert_eq!(rebuilt, mutation);
            }
        }
    }
}
