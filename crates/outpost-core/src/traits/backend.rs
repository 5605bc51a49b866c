// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Remote backend trait consumed by the write dispatcher and the flush engine.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::BackendError;
use crate::traits::adapter::Adapter;
use crate::types::Filter;

/// The remote database the outbox replays into.
///
/// Four table calls plus one named-procedure call. Each returns the
/// backend's response body on success or a structured [`BackendError`].
/// Upserts are expected to honour the conflict target in `options`, which is
/// what makes replaying the same intent twice harmless.
#[async_trait]
pub trait RemoteBackend: Adapter {
    async fn insert(
        &self,
        table: &str,
        payload: &Value,
        options: &Map<String, Value>,
    ) -> Result<Value, BackendError>;

    async fn upsert(
        &self,
        table: &str,
        payload: &Value,
        options: &Map<String, Value>,
    ) -> Result<Value, BackendError>;

    async fn update(
        &self,
        table: &str,
        payload: &Value,
        filters: &[Filter],
    ) -> Result<Value, BackendError>;

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<Value, BackendError>;

    async fn rpc(&self, name: &str, params: &Value) -> Result<Value, BackendError>;
}
