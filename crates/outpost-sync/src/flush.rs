// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ordered replay of queued mutations.
//!
//! A pass walks a snapshot of the queue oldest-first and stops at the first
//! backend failure, so a later intent never lands before an earlier one that
//! is still stuck. Each record is re-read before it is sent: one cancelled
//! or superseded since the snapshot is skipped. Records are deleted only
//! after the backend accepts them; a crash in between replays the record
//! again on the next pass, which the conflict-target upsert turns into a
//! no-op.

use std::sync::Arc;

use outpost_config::model::OutboxConfig;
use outpost_core::{
    BackendError, Clock, FlushFailure, FlushReport, OutboxStore, OutpostError, QueuedMutation,
    RemoteBackend,
};
use tracing::{debug, info, warn};

use crate::connectivity::ConnectivityMonitor;
use crate::execute::execute;
use crate::outbox::Outbox;

/// Tuning for a flush pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    /// Records taken per pass when no explicit limit is given.
    pub batch_size: usize,
    /// Failed attempts after which a record is dead-lettered. 0 never does.
    pub max_attempts: u32,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self::from(&OutboxConfig::default())
    }
}

impl From<&OutboxConfig> for FlushPolicy {
    fn from(config: &OutboxConfig) -> Self {
        Self {
            batch_size: config.flush_batch_size,
            max_attempts: config.max_attempts,
        }
    }
}

/// Replays the outbox against the remote backend.
///
/// Share the [`Outbox`] with the [`WriteDispatcher`](crate::WriteDispatcher)
/// so replay steps and immediate writes never interleave.
pub struct FlushEngine {
    outbox: Outbox,
    backend: Arc<dyn RemoteBackend>,
    monitor: ConnectivityMonitor,
    policy: FlushPolicy,
}

impl FlushEngine {
    pub fn new(
        outbox: Outbox,
        backend: Arc<dyn RemoteBackend>,
        monitor: ConnectivityMonitor,
        policy: FlushPolicy,
    ) -> Self {
        Self {
            outbox,
            backend,
            monitor,
            policy,
        }
    }

    pub fn policy(&self) -> FlushPolicy {
        self.policy
    }

    /// Run one pass over at most `limit` records (the batch size if `None`).
    ///
    /// Backend failures end the pass and are described in the report.
    /// Storage failures are returned as `Err`.
    pub async fn flush(&self, limit: Option<usize>) -> Result<FlushReport, OutpostError> {
        if !self.monitor.is_online() {
            debug!("offline, skipping flush");
            return Ok(FlushReport::default());
        }

        let store: &Arc<dyn OutboxStore> = self.outbox.store();
        let limit = limit.unwrap_or(self.policy.batch_size);
        let snapshot = store.list_ordered_by_updated_at(limit).await?;
        if snapshot.is_empty() {
            return Ok(FlushReport::default());
        }
        debug!(records = snapshot.len(), "flush pass started");

        let mut report = FlushReport::default();
        for queued in snapshot {
            let _replay = self.outbox.replay_lock().await;
            let Some(record) = store.get(&queued.id).await? else {
                debug!(
                    id = %queued.id,
                    dedupe_key = %queued.dedupe_key,
                    "record cancelled or superseded since the snapshot, skipping"
                );
                continue;
            };
            match execute(self.backend.as_ref(), &record.mutation).await {
                Ok(_) => {
                    store.delete(&record.id).await?;
                    report.flushed += 1;
                }
                Err(error) => {
                    report.failure = Some(self.record_failure(&record, error).await?);
                    break;
                }
            }
        }

        let remaining = store.count().await?;
        info!(
            flushed = report.flushed,
            halted = report.failure.is_some(),
            remaining,
            "flush pass finished"
        );
        Ok(report)
    }

    async fn record_failure(
        &self,
        record: &QueuedMutation,
        error: BackendError,
    ) -> Result<FlushFailure, OutpostError> {
        let store = self.outbox.store();
        let message = error.to_string();
        let now = self.outbox.clock().now_millis();
        let updated = store
            .record_failure(&record.id, &message, now)
            .await
            .inspect_err(|e| {
                warn!(
                    id = %record.id,
                    dedupe_key = %record.dedupe_key,
                    backend_error = %message,
                    error = %e,
                    "replay failed and its bookkeeping could not be saved"
                );
            })?;
        // `None` means the record vanished between send and bookkeeping.
        let attempt_count = match updated {
            Some(updated) => updated.attempt_count,
            None => record.attempt_count + 1,
        };

        warn!(
            id = %record.id,
            dedupe_key = %record.dedupe_key,
            attempt_count,
            transient = error.is_transient(),
            error = %message,
            "replay failed, halting flush pass"
        );

        let exhausted = self.policy.max_attempts > 0 && attempt_count >= self.policy.max_attempts;
        let dead_lettered = exhausted && store.dead_letter(&record.id, now).await?.is_some();
        if dead_lettered {
            warn!(
                id = %record.id,
                dedupe_key = %record.dedupe_key,
                attempt_count,
                "record moved to dead letters"
            );
        }

        Ok(FlushFailure {
            id: record.id.clone(),
            dedupe_key: record.dedupe_key.clone(),
            error,
            attempt_count,
            dead_lettered,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use outpost_core::{Mutation, MutationIntent};
    use outpost_test_utils::{FaultyStore, ManualClock, MockBackend, temp_store};
    use serde_json::json;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    struct Fixture {
        store: Arc<dyn OutboxStore>,
        backend: Arc<MockBackend>,
        monitor: ConnectivityMonitor,
        clock: Arc<ManualClock>,
        outbox: Outbox,
        _dir: TempDir,
    }

    async fn fixture(policy: FlushPolicy) -> (Fixture, FlushEngine) {
        let (store, dir) = temp_store().await;
        let store: Arc<dyn OutboxStore> = store;
        let backend = Arc::new(MockBackend::new());
        let monitor = ConnectivityMonitor::new(true);
        let clock = Arc::new(ManualClock::new(0));
        let outbox = Outbox::new(store.clone(), clock.clone());
        let engine = FlushEngine::new(outbox.clone(), backend.clone(), monitor.clone(), policy);
        let fixture = Fixture {
            store,
            backend,
            monitor,
            clock,
            outbox,
            _dir: dir,
        };
        (fixture, engine)
    }

    fn edit(key: &str, id: &str, name: &str) -> MutationIntent {
        MutationIntent::new(
            key,
            Mutation::upsert("people", json!({"id": id, "name": name})).on_conflict("id"),
        )
    }

    impl Fixture {
        async fn enqueue(&self, intent: MutationIntent) -> String {
            let id = self.outbox.enqueue(intent).await.unwrap();
            self.clock.advance(1);
            id
        }
    }

    #[tokio::test]
    async fn offline_flush_is_a_noop() {
        let (fx, engine) = fixture(FlushPolicy::default()).await;
        fx.enqueue(edit("people:p1", "p1", "Ana")).await;
        fx.monitor.set_online(false);

        let report = engine.flush(None).await.unwrap();
        assert_eq!(report, FlushReport::default());
        assert!(fx.backend.calls().await.is_empty());
        assert_eq!(fx.store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn replays_in_order_and_empties_queue() {
        let (fx, engine) = fixture(FlushPolicy::default()).await;
        fx.enqueue(edit("people:p1", "p1", "Ana")).await;
        fx.enqueue(edit("people:p2", "p2", "Bia")).await;
        fx.enqueue(edit("people:p3", "p3", "Caio")).await;

        let report = engine.flush(None).await.unwrap();
        assert_eq!(report.flushed, 3);
        assert!(report.is_clean());
        assert_eq!(fx.store.count().await.unwrap(), 0);

        let targets: Vec<_> = fx
            .backend
            .calls()
            .await
            .into_iter()
            .map(|c| c.payload["id"].clone())
            .collect();
        assert_eq!(targets, [json!("p1"), json!("p2"), json!("p3")]);
    }

    #[tokio::test]
    async fn failure_halts_the_pass_and_records_bookkeeping() {
        let (fx, engine) = fixture(FlushPolicy::default()).await;
        let a = fx.enqueue(edit("people:p1", "p1", "Ana")).await;
        let b = fx.enqueue(edit("people:p2", "p2", "Bia")).await;
        let c = fx.enqueue(edit("people:p3", "p3", "Caio")).await;
        fx.backend
            .fail_target_where("people", "id", json!("p2"), BackendError::api(409, "conflict"))
            .await;
        fx.clock.set(500);

        let report = engine.flush(None).await.unwrap();
        assert_eq!(report.flushed, 1);
        let failure = report.failure.unwrap();
        assert_eq!(failure.id, b);
        assert_eq!(failure.attempt_count, 1);
        assert!(!failure.dead_lettered);

        assert!(fx.store.get(&a).await.unwrap().is_none());
        let stuck = fx.store.get(&b).await.unwrap().unwrap();
        assert_eq!(stuck.attempt_count, 1);
        assert_eq!(stuck.updated_at, 500);
        assert!(stuck.last_error.unwrap().contains("conflict"));
        assert!(fx.store.get(&c).await.unwrap().is_some(), "C never attempted");
        assert_eq!(fx.backend.calls().await.len(), 2);
    }

    #[tokio::test]
    async fn failed_record_moves_behind_later_ones() {
        let (fx, engine) = fixture(FlushPolicy::default()).await;
        fx.enqueue(edit("people:p1", "p1", "Ana")).await;
        fx.enqueue(edit("people:p2", "p2", "Bia")).await;
        fx.backend.fail_next(BackendError::transport("reset")).await;
        fx.clock.set(1_000);

        engine.flush(None).await.unwrap();
        let order: Vec<_> = fx
            .outbox
            .pending(10)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.dedupe_key)
            .collect();
        assert_eq!(order, ["people:p2", "people:p1"]);
    }

    #[tokio::test]
    async fn limit_bounds_the_snapshot() {
        let (fx, engine) = fixture(FlushPolicy {
            batch_size: 2,
            max_attempts: 0,
        })
        .await;
        for i in 0..5 {
            fx.enqueue(edit(&format!("people:p{i}"), &format!("p{i}"), "x")).await;
        }

        assert_eq!(engine.flush(None).await.unwrap().flushed, 2);
        assert_eq!(engine.flush(Some(1)).await.unwrap().flushed, 1);
        assert_eq!(fx.store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn exhausted_record_is_dead_lettered() {
        let (fx, engine) = fixture(FlushPolicy {
            batch_size: 10,
            max_attempts: 2,
        })
        .await;
        let poison = fx.enqueue(edit("people:p1", "p1", "Ana")).await;
        fx.enqueue(edit("people:p2", "p2", "Bia")).await;
        fx.backend
            .fail_target_where("people", "id", json!("p1"), BackendError::api(400, "bad row"))
            .await;

        let first = engine.flush(None).await.unwrap();
        assert!(!first.failure.unwrap().dead_lettered);

        let second = engine.flush(None).await.unwrap();
        assert_eq!(second.flushed, 1, "p2 goes through once p1 moved behind it");
        let failure = second.failure.unwrap();
        assert_eq!(failure.id, poison);
        assert_eq!(failure.attempt_count, 2);
        assert!(failure.dead_lettered);

        assert_eq!(fx.store.count().await.unwrap(), 0);
        let letters = fx.store.list_dead_letters(10).await.unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].record.id, poison);
    }

    #[tokio::test]
    async fn record_cancelled_mid_pass_is_not_sent() {
        let (fx, engine) = fixture(FlushPolicy::default()).await;
        fx.enqueue(edit("people:p1", "p1", "Ana")).await;
        let b = fx.enqueue(edit("people:p2", "p2", "Bia")).await;
        fx.backend.set_delay(Duration::from_millis(100)).await;

        let engine = Arc::new(engine);
        let pass = tokio::spawn({
            let engine = engine.clone();
            async move { engine.flush(None).await }
        });
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(fx.outbox.cancel(&b).await.unwrap(), "p2 not yet sent");

        let report = pass.await.unwrap().unwrap();
        assert_eq!(report.flushed, 1);
        assert!(report.is_clean());
        let sent: Vec<_> = fx
            .backend
            .calls()
            .await
            .into_iter()
            .map(|c| c.payload["id"].clone())
            .collect();
        assert_eq!(sent, [json!("p1")]);
        assert_eq!(fx.store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn cancel_of_record_in_flight_reports_it_already_sent() {
        let (fx, engine) = fixture(FlushPolicy::default()).await;
        let a = fx.enqueue(edit("people:p1", "p1", "Ana")).await;
        fx.backend.set_delay(Duration::from_millis(100)).await;

        let engine = Arc::new(engine);
        let pass = tokio::spawn({
            let engine = engine.clone();
            async move { engine.flush(None).await }
        });
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!fx.outbox.cancel(&a).await.unwrap());
        assert_eq!(pass.await.unwrap().unwrap().flushed, 1);
        assert_eq!(fx.backend.rows("people").await.len(), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn bookkeeping_failure_still_logs_the_backend_error() {
        let (store, _dir) = temp_store().await;
        let faulty = Arc::new(FaultyStore::new(store));
        let backend = Arc::new(MockBackend::new());
        let outbox = Outbox::new(faulty.clone(), Arc::new(ManualClock::new(0)));
        let engine = FlushEngine::new(
            outbox.clone(),
            backend.clone(),
            ConnectivityMonitor::new(true),
            FlushPolicy::default(),
        );
        outbox.enqueue(edit("people:p1", "p1", "Ana")).await.unwrap();
        backend
            .fail_next(BackendError::api(503, "upstream unavailable"))
            .await;
        faulty.fail_writes(1);

        assert!(matches!(
            engine.flush(None).await,
            Err(OutpostError::Storage { .. })
        ));
        assert!(logs_contain("upstream unavailable"));
        assert_eq!(faulty.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn zero_max_attempts_never_dead_letters() {
        let (fx, engine) = fixture(FlushPolicy {
            batch_size: 10,
            max_attempts: 0,
        })
        .await;
        fx.enqueue(edit("people:p1", "p1", "Ana")).await;
        fx.backend
            .fail_target("people", BackendError::api(400, "bad row"))
            .await;

        for _ in 0..5 {
            engine.flush(None).await.unwrap();
        }
        assert_eq!(fx.store.count().await.unwrap(), 1);
        assert_eq!(fx.store.count_dead_letters().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_failure_after_remote_success_replays_idempotently() {
        let (store, _dir) = temp_store().await;
        let faulty = Arc::new(FaultyStore::new(store));
        let backend = Arc::new(MockBackend::new());
        let clock = Arc::new(ManualClock::new(0));
        let monitor = ConnectivityMonitor::new(true);
        let outbox = Outbox::new(faulty.clone(), clock);
        let engine = FlushEngine::new(outbox.clone(), backend.clone(), monitor, FlushPolicy::default());

        outbox
            .enqueue(edit("people:p1", "p1", "Ana"))
            .await
            .unwrap();
        faulty.fail_deletes(1);

        assert!(matches!(
            engine.flush(None).await,
            Err(OutpostError::Storage { .. })
        ));
        assert_eq!(faulty.count().await.unwrap(), 1, "record still queued");

        let report = engine.flush(None).await.unwrap();
        assert_eq!(report.flushed, 1);
        assert_eq!(backend.calls().await.len(), 2, "applied twice");
        assert_eq!(
            backend.rows("people").await,
            vec![json!({"id": "p1", "name": "Ana"})]
        );
    }
}
