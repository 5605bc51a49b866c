// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mutation-to-backend call mapping shared by the write and replay paths.

use outpost_core::{BackendError, Mutation, RemoteBackend};
use serde_json::Value;

/// Apply one mutation against the backend.
pub async fn execute(backend: &dyn RemoteBackend, mutation: &Mutation) -> Result<Value, BackendError> {
    match mutation {
        Mutation::Insert {
            table,
            payload,
            options,
        } => backend.insert(table, payload, options).await,
        Mutation::Upsert {
            table,
            payload,
            options,
        } => backend.upsert(table, payload, options).await,
        Mutation::Update {
            table,
            payload,
            filters,
        } => backend.update(table, payload, filters).await,
        Mutation::Delete { table, filters } => backend.delete(table, filters).await,
        Mutation::Rpc { name, params } => backend.rpc(name, params).await,
    }
}
