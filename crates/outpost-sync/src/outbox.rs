// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The dedupe-merge engine and queue management.

use std::sync::Arc;

use outpost_core::{
    Clock, DeadLetter, MutationIntent, OutboxStore, OutpostError, QueuedMutation,
};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

/// Result of moving a dead letter back into the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requeue {
    /// Re-enqueued under a fresh id.
    Requeued { id: String },
    /// A newer intent for the same key is already pending; the dead letter
    /// was dropped instead of overwriting it.
    Superseded { pending_id: String },
    NotFound,
}

/// Front door to the durable store.
///
/// Every enqueue goes through [`Outbox::enqueue`], which keeps at most one
/// record per dedupe key.
///
/// Clones share one replay lock. A flush step (re-read, send, delete), an
/// immediate write, and a cancel each hold it, so none of them interleave
/// with the others.
#[derive(Clone)]
pub struct Outbox {
    store: Arc<dyn OutboxStore>,
    clock: Arc<dyn Clock>,
    replay: Arc<Mutex<()>>,
}

impl Outbox {
    pub fn new(store: Arc<dyn OutboxStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            replay: Arc::new(Mutex::new(())),
        }
    }

    pub fn store(&self) -> &Arc<dyn OutboxStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub(crate) async fn replay_lock(&self) -> MutexGuard<'_, ()> {
        self.replay.lock().await
    }

    /// Persist `intent`, replacing anything queued under the same key.
    ///
    /// The replacement gets a new id and both timestamps set to now, which
    /// moves the key to the back of the replay order. Returns the new id.
    pub async fn enqueue(&self, intent: MutationIntent) -> Result<String, OutpostError> {
        intent.mutation.validate()?;
        self.persist(intent).await
    }

    /// [`Outbox::enqueue`] for intents the caller has already validated.
    pub(crate) async fn persist(&self, intent: MutationIntent) -> Result<String, OutpostError> {
        let now = self.clock.now_millis();
        let record = QueuedMutation {
            id: Uuid::new_v4().to_string(),
            dedupe_key: intent.dedupe_key,
            mutation: intent.mutation,
            created_at: now,
            updated_at: now,
            attempt_count: 0,
            last_error: None,
        };

        let superseded = self.store.replace_by_dedupe_key(&record).await?;
        debug!(
            id = %record.id,
            dedupe_key = %record.dedupe_key,
            op = %record.mutation.operation(),
            target = record.mutation.target(),
            superseded = superseded.len(),
            "mutation enqueued"
        );
        Ok(record.id)
    }

    /// Remove a pending record. Returns whether it existed.
    ///
    /// Waits for an in-flight replay step, so a record being sent right now
    /// is either delivered (and `false` is returned) or never sent.
    pub async fn cancel(&self, id: &str) -> Result<bool, OutpostError> {
        let _replay = self.replay_lock().await;
        let existed = self.store.delete(id).await?;
        if existed {
            info!(id, "queued mutation cancelled");
        }
        Ok(existed)
    }

    /// Drop whatever is queued under `dedupe_key` after a newer intent for
    /// the key reached the backend directly. Caller holds the replay lock.
    pub(crate) async fn clear_key(&self, dedupe_key: &str) -> Result<u64, OutpostError> {
        let cleared = self.store.delete_by_dedupe_key(dedupe_key).await?;
        if cleared > 0 {
            info!(dedupe_key, cleared, "stale queued intent superseded by immediate write");
        }
        Ok(cleared)
    }

    /// Pending records in replay order.
    pub async fn pending(&self, limit: usize) -> Result<Vec<QueuedMutation>, OutpostError> {
        self.store.list_ordered_by_updated_at(limit).await
    }

    pub async fn len(&self) -> Result<u64, OutpostError> {
        self.store.count().await
    }

    pub async fn is_empty(&self) -> Result<bool, OutpostError> {
        Ok(self.len().await? == 0)
    }

    pub async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, OutpostError> {
        self.store.list_dead_letters(limit).await
    }

    pub async fn dead_letter_count(&self) -> Result<u64, OutpostError> {
        self.store.count_dead_letters().await
    }

    /// Put a dead letter back in the queue as a fresh intent.
    pub async fn requeue(&self, id: &str) -> Result<Requeue, OutpostError> {
        let Some(letter) = self.store.take_dead_letter(id).await? else {
            return Ok(Requeue::NotFound);
        };
        let record = letter.record;

        let pending = self.store.find_by_dedupe_key(&record.dedupe_key).await?;
        if let Some(newer) = pending.into_iter().next() {
            info!(
                id,
                pending_id = %newer.id,
                dedupe_key = %record.dedupe_key,
                "dead letter superseded by a pending intent, dropped"
            );
            return Ok(Requeue::Superseded {
                pending_id: newer.id,
            });
        }

        let new_id = self
            .enqueue(MutationIntent::new(record.dedupe_key, record.mutation))
            .await?;
        info!(id, new_id = %new_id, "dead letter requeued");
        Ok(Requeue::Requeued { id: new_id })
    }

    /// Drop a dead letter for good. Returns whether it existed.
    pub async fn discard(&self, id: &str) -> Result<bool, OutpostError> {
        let existed = self.store.take_dead_letter(id).await?.is_some();
        if existed {
            info!(id, "dead letter discarded");
        }
        Ok(existed)
    }
}
