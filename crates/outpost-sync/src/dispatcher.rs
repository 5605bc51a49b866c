// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Write entry point for callers.

use std::sync::Arc;

use outpost_core::{BackendError, MutationIntent, OutpostError, RemoteBackend, WriteOutcome};
use tracing::{debug, error, warn};

use crate::connectivity::ConnectivityMonitor;
use crate::execute::execute;
use crate::outbox::Outbox;

/// Applies writes immediately when possible, otherwise queues them.
///
/// The dispatcher never retries. A failed immediate attempt is queued and
/// left to the flush engine. A successful one drops anything still queued
/// under the same key, since that intent is now stale.
#[derive(Clone)]
pub struct WriteDispatcher {
    outbox: Outbox,
    backend: Arc<dyn RemoteBackend>,
    monitor: ConnectivityMonitor,
}

impl WriteDispatcher {
    pub fn new(outbox: Outbox, backend: Arc<dyn RemoteBackend>, monitor: ConnectivityMonitor) -> Self {
        Self {
            outbox,
            backend,
            monitor,
        }
    }

    /// Dispatch one intent.
    ///
    /// Offline intents are queued without a remote call. Online intents are
    /// sent once; any backend failure queues them and is reported in the
    /// outcome rather than as an `Err`. The only `Err` is a storage failure
    /// (or a malformed intent, rejected before any I/O).
    pub async fn write(&self, intent: MutationIntent) -> Result<WriteOutcome, OutpostError> {
        // The only validation on this path; queueing goes through `persist`.
        intent.mutation.validate()?;

        if !self.monitor.is_online() {
            debug!(dedupe_key = %intent.dedupe_key, "offline, queueing write");
            let id = self.enqueue(intent, None).await?;
            return Ok(WriteOutcome::Queued { id, error: None });
        }

        let _replay = self.outbox.replay_lock().await;
        match execute(self.backend.as_ref(), &intent.mutation).await {
            Ok(data) => {
                self.outbox
                    .clear_key(&intent.dedupe_key)
                    .await
                    .inspect_err(|e| {
                        error!(
                            dedupe_key = %intent.dedupe_key,
                            error = %e,
                            "write applied but the stale queued intent could not be dropped"
                        );
                    })?;
                Ok(WriteOutcome::Applied { data })
            }
            Err(err) => {
                warn!(
                    dedupe_key = %intent.dedupe_key,
                    target = intent.mutation.target(),
                    transient = err.is_transient(),
                    error = %err,
                    "immediate write failed, queueing"
                );
                let id = self.enqueue(intent, Some(&err)).await?;
                Ok(WriteOutcome::Queued {
                    id,
                    error: Some(err),
                })
            }
        }
    }

    async fn enqueue(
        &self,
        intent: MutationIntent,
        cause: Option<&BackendError>,
    ) -> Result<String, OutpostError> {
        let dedupe_key = intent.dedupe_key.clone();
        self.outbox.persist(intent).await.inspect_err(|e| {
            error!(
                dedupe_key = %dedupe_key,
                cause = ?cause.map(ToString::to_string),
                error = %e,
                "failed to persist queued write, mutation lost"
            );
        })
    }
}
