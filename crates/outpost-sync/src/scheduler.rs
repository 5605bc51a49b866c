// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connectivity-triggered flush scheduling.
//!
//! A pass starts when the scheduler starts and on every reconnect. There is
//! no periodic timer. At most one pass runs at a time; a trigger that
//! arrives while one is running is dropped, not queued.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use outpost_core::{FlushReport, OutpostError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use crate::connectivity::ConnectivityMonitor;
use crate::flush::FlushEngine;

/// Clears the running flag when a pass ends, including by panic.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Single-flight wrapper around a [`FlushEngine`].
pub struct FlushScheduler {
    engine: Arc<FlushEngine>,
    running: AtomicBool,
    passes: TaskTracker,
}

impl FlushScheduler {
    pub fn new(engine: Arc<FlushEngine>) -> Self {
        Self {
            engine,
            running: AtomicBool::new(false),
            passes: TaskTracker::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one pass now, unless one is already in progress.
    ///
    /// Returns `None` when the trigger was dropped.
    pub async fn trigger(&self) -> Option<Result<FlushReport, OutpostError>> {
        let Some(_guard) = RunningGuard::acquire(&self.running) else {
            debug!("flush already running, trigger dropped");
            return None;
        };
        Some(self.engine.flush(None).await)
    }

    /// Fire a trigger on its own task and log the outcome.
    fn trigger_in_background(self: &Arc<Self>, reason: &'static str) {
        let this = Arc::clone(self);
        self.passes.spawn(async move {
            match this.trigger().await {
                Some(Ok(report)) => {
                    debug!(reason, flushed = report.flushed, "triggered flush done");
                }
                Some(Err(e)) => error!(reason, error = %e, "flush pass failed"),
                None => {}
            }
        });
    }

    /// Trigger once now, then on every reconnect until `shutdown` fires.
    ///
    /// The returned task finishes after shutdown once any pass still running
    /// has completed; passes are never cancelled midway.
    pub fn spawn(
        self: Arc<Self>,
        monitor: ConnectivityMonitor,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut rx = monitor.subscribe();
            let mut reconnects = rx.borrow_and_update().reconnects;
            self.trigger_in_background("startup");

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let state = *rx.borrow_and_update();
                        if state.reconnects != reconnects {
                            reconnects = state.reconnects;
                            self.trigger_in_background("reconnect");
                        }
                    }
                }
            }

            self.passes.close();
            self.passes.wait().await;
            info!("flush scheduler stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use outpost_core::{Mutation, MutationIntent, OutboxStore};
    use outpost_test_utils::{ManualClock, MockBackend, temp_store};
    use serde_json::json;

    use crate::flush::FlushPolicy;
    use crate::outbox::Outbox;

    async fn wait_until<F: Fn() -> bool>(cond: F) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    async fn wait_for_empty(store: &dyn OutboxStore) {
        for _ in 0..200 {
            if store.count().await.unwrap() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("queue never drained");
    }

    #[tokio::test]
    async fn overlapping_trigger_is_dropped() {
        let (store, _dir) = temp_store().await;
        let backend = Arc::new(MockBackend::new());
        backend.set_delay(Duration::from_millis(100)).await;
        let clock = Arc::new(ManualClock::new(0));
        let monitor = ConnectivityMonitor::new(true);
        let outbox = Outbox::new(store, clock);
        outbox
            .enqueue(MutationIntent::new(
                "people:p1",
                Mutation::upsert("people", json!({"id": "p1"})).on_conflict("id"),
            ))
            .await
            .unwrap();

        let engine = Arc::new(FlushEngine::new(
            outbox,
            backend.clone(),
            monitor,
            FlushPolicy::default(),
        ));
        let scheduler = Arc::new(FlushScheduler::new(engine));

        let (first, second) = tokio::join!(scheduler.trigger(), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            scheduler.trigger().await
        });
        assert_eq!(first.unwrap().unwrap().flushed, 1);
        assert!(second.is_none());
        assert!(!scheduler.is_running());
        assert_eq!(backend.calls().await.len(), 1);

        // The flag is released; the next trigger runs.
        assert!(scheduler.trigger().await.is_some());
    }

    #[tokio::test]
    async fn spawn_flushes_at_start_and_on_reconnect() {
        let (store, _dir) = temp_store().await;
        let backend = Arc::new(MockBackend::new());
        let clock = Arc::new(ManualClock::new(0));
        let monitor = ConnectivityMonitor::new(true);
        let outbox = Outbox::new(store.clone(), clock.clone());
        let intent = |id: &str| {
            MutationIntent::new(
                format!("people:{id}"),
                Mutation::upsert("people", json!({"id": id})).on_conflict("id"),
            )
        };
        outbox.enqueue(intent("p1")).await.unwrap();

        let engine = Arc::new(FlushEngine::new(
            outbox.clone(),
            backend.clone(),
            monitor.clone(),
            FlushPolicy::default(),
        ));
        let shutdown = CancellationToken::new();
        let handle = Arc::new(FlushScheduler::new(engine)).spawn(monitor.clone(), shutdown.clone());

        wait_for_empty(store.as_ref()).await;
        assert_eq!(backend.call_count(), 1);

        monitor.set_online(false);
        outbox.enqueue(intent("p2")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(backend.call_count(), 1, "no flush while offline");

        monitor.set_online(true);
        wait_until(|| backend.call_count() == 2).await;

        shutdown.cancel();
        handle.await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
