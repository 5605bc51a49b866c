// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable store trait for queued mutations.

use async_trait::async_trait;

use crate::error::OutpostError;
use crate::traits::adapter::Adapter;
use crate::types::{DeadLetter, QueuedMutation};

/// Persistent table of pending mutations.
///
/// Implementations must survive process restarts and must make every
/// multi-step operation below atomic. Any persistence failure is reported as
/// [`OutpostError::Storage`].
#[async_trait]
pub trait OutboxStore: Adapter {
    /// Inserts or replaces a record by id.
    async fn put(&self, record: &QueuedMutation) -> Result<(), OutpostError>;

    async fn get(&self, id: &str) -> Result<Option<QueuedMutation>, OutpostError>;

    /// All records sharing `dedupe_key`. Normally zero or one.
    async fn find_by_dedupe_key(&self, dedupe_key: &str)
    -> Result<Vec<QueuedMutation>, OutpostError>;

    /// Removes a record without decoding it. Returns whether a row was
    /// removed; absent ids are not an error.
    async fn delete(&self, id: &str) -> Result<bool, OutpostError>;

    /// Removes every record sharing `dedupe_key`, returning how many went.
    async fn delete_by_dedupe_key(&self, dedupe_key: &str) -> Result<u64, OutpostError>;

    /// Up to `limit` records, oldest `updated_at` first.
    async fn list_ordered_by_updated_at(
        &self,
        limit: usize,
    ) -> Result<Vec<QueuedMutation>, OutpostError>;

    async fn count(&self) -> Result<u64, OutpostError>;

    /// Deletes every record sharing `record.dedupe_key` and inserts `record`,
    /// in one transaction. Returns the ids that were removed.
    async fn replace_by_dedupe_key(
        &self,
        record: &QueuedMutation,
    ) -> Result<Vec<String>, OutpostError>;

    /// Bumps `attempt_count`, stores `message` as `last_error`, and moves
    /// `updated_at` to `now`. Returns the updated record, or `None` if the id
    /// no longer exists.
    async fn record_failure(
        &self,
        id: &str,
        message: &str,
        now: i64,
    ) -> Result<Option<QueuedMutation>, OutpostError>;

    /// Moves a record from the outbox into the dead-letter table.
    async fn dead_letter(&self, id: &str, now: i64) -> Result<Option<DeadLetter>, OutpostError>;

    /// Up to `limit` dead letters, oldest first.
    async fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, OutpostError>;

    /// Removes a dead letter and returns it.
    async fn take_dead_letter(&self, id: &str) -> Result<Option<DeadLetter>, OutpostError>;

    async fn count_dead_letters(&self) -> Result<u64, OutpostError>;
}
