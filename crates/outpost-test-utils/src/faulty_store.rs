// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store wrapper that fails a chosen number of operations.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use outpost_core::{Adapter, DeadLetter, HealthStatus, OutboxStore, OutpostError, QueuedMutation};

/// Delegates to an inner store, failing the next N deletes or writes.
///
/// Writes are `put`, `replace_by_dedupe_key` and `record_failure`; deletes
/// are `delete` and `delete_by_dedupe_key`.
pub struct FaultyStore {
    inner: Arc<dyn OutboxStore>,
    failing_deletes: AtomicUsize,
    failing_writes: AtomicUsize,
}

/// Consume one pending failure, if any remain.
fn take(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn OutboxStore>) -> Self {
        Self {
            inner,
            failing_deletes: AtomicUsize::new(0),
            failing_writes: AtomicUsize::new(0),
        }
    }

    pub fn fail_deletes(&self, n: usize) {
        self.failing_deletes.store(n, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl Adapter for FaultyStore {
    fn name(&self) -> &str {
        "faulty-store"
    }

    async fn health_check(&self) -> Result<HealthStatus, OutpostError> {
        self.inner.health_check().await
    }
}

#[async_trait]
impl OutboxStore for FaultyStore {
    async fn put(&self, record: &QueuedMutation) -> Result<(), OutpostError> {
        if take(&self.failing_writes) {
            return Err(OutpostError::storage("injected write failure"));
        }
        self.inner.put(record).await
    }

    async fn get(&self, id: &str) -> Result<Option<QueuedMutation>, OutpostError> {
        self.inner.get(id).await
    }

    async fn find_by_dedupe_key(
        &self,
        dedupe_key: &str,
    ) -> Result<Vec<QueuedMutation>, OutpostError> {
        self.inner.find_by_dedupe_key(dedupe_key).await
    }

    async fn delete(&self, id: &str) -> Result<bool, OutpostError> {
        if take(&self.failing_deletes) {
            return Err(OutpostError::storage("injected delete failure"));
        }
        self.inner.delete(id).await
    }

    async fn delete_by_dedupe_key(&self, dedupe_key: &str) -> Result<u64, OutpostError> {
        if take(&self.failing_deletes) {
            return Err(OutpostError::storage("injected delete failure"));
        }
        self.inner.delete_by_dedupe_key(dedupe_key).await
    }

    async fn list_ordered_by_updated_at(
        &self,
        limit: usize,
    ) -> Result<Vec<QueuedMutation>, OutpostError> {
        self.inner.list_ordered_by_updated_at(limit).await
    }

    async fn count(&self) -> Result<u64, OutpostError> {
        self.inner.count().await
    }

    async fn replace_by_dedupe_key(
        &self,
        record: &QueuedMutation,
    ) -> Result<Vec<String>, OutpostError> {
        if take(&self.failing_writes) {
            return Err(OutpostError::storage("injected write failure"));
        }
        self.inner.replace_by_dedupe_key(record).await
    }

    async fn record_failure(
        &self,
        id: &str,
        message: &str,
        now: i64,
    ) -> Result<Option<QueuedMutation>, OutpostError> {
        if take(&self.failing_writes) {
            return Err(OutpostError::storage("injected write failure"));
        }
        self.inner.record_failure(id, message, now).await
    }

    async fn dead_letter(&self, id: &str, now: i64) -> Result<Option<DeadLetter>, OutpostError> {
        self.inner.dead_letter(id, now).await
    }

    async fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, OutpostError> {
        self.inner.list_dead_letters(limit).await
    }

    async fn take_dead_letter(&self, id: &str) -> Result<Option<DeadLetter>, OutpostError> {
        self.inner.take_dead_letter(id).await
    }

    async fn count_dead_letters(&self) -> Result<u64, OutpostError> {
        self.inner.count_dead_letters().await
    }
}
