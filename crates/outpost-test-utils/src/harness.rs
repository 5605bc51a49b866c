// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the whole outbox stack (SQLite store, dispatcher,
//! flush engine, scheduler) over a temp database and a [`MockBackend`].
//! [`TestHarness::restart`] reopens the same database file to simulate a
//! process restart.

use std::path::PathBuf;
use std::sync::Arc;

use outpost_config::model::StorageConfig;
use outpost_core::{
    FlushReport, MutationIntent, OutboxStore, OutpostError, QueuedMutation, WriteOutcome,
};
use outpost_storage::SqliteOutbox;
use outpost_sync::{
    ConnectivityMonitor, FlushEngine, FlushPolicy, FlushScheduler, Outbox, WriteDispatcher,
};
use tempfile::TempDir;

use crate::clock::ManualClock;
use crate::mock_backend::MockBackend;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    online: bool,
    policy: FlushPolicy,
    backend: Option<Arc<MockBackend>>,
    start_millis: i64,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            online: true,
            policy: FlushPolicy::default(),
            backend: None,
            start_millis: 1_000,
        }
    }

    /// Start online or offline. Defaults to online.
    pub fn online(mut self, online: bool) -> Self {
        self.online = online;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.policy.batch_size = batch_size;
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.policy.max_attempts = max_attempts;
        self
    }

    /// Use a backend shared with the test body.
    pub fn with_backend(mut self, backend: Arc<MockBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, OutpostError> {
        let dir = TempDir::new().map_err(OutpostError::storage)?;
        let db_path = dir.path().join("outbox.db");
        let backend = self.backend.unwrap_or_default();
        let clock = Arc::new(ManualClock::new(self.start_millis));
        let monitor = ConnectivityMonitor::new(self.online);
        TestHarness::assemble(dir, db_path, backend, clock, monitor, self.policy).await
    }
}

/// A complete outbox stack over temp storage and a mock backend.
pub struct TestHarness {
    pub store: Arc<SqliteOutbox>,
    pub backend: Arc<MockBackend>,
    pub clock: Arc<ManualClock>,
    pub monitor: ConnectivityMonitor,
    pub outbox: Outbox,
    pub dispatcher: WriteDispatcher,
    pub engine: Arc<FlushEngine>,
    pub scheduler: Arc<FlushScheduler>,
    policy: FlushPolicy,
    db_path: PathBuf,
    _dir: TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    async fn assemble(
        dir: TempDir,
        db_path: PathBuf,
        backend: Arc<MockBackend>,
        clock: Arc<ManualClock>,
        monitor: ConnectivityMonitor,
        policy: FlushPolicy,
    ) -> Result<Self, OutpostError> {
        let store = Arc::new(
            SqliteOutbox::open(StorageConfig {
                database_path: db_path.to_string_lossy().into_owned(),
                wal_mode: true,
            })
            .await?,
        );
        let outbox = Outbox::new(store.clone(), clock.clone());
        let dispatcher = WriteDispatcher::new(outbox.clone(), backend.clone(), monitor.clone());
        let engine = Arc::new(FlushEngine::new(
            outbox.clone(),
            backend.clone(),
            monitor.clone(),
            policy,
        ));
        let scheduler = Arc::new(FlushScheduler::new(engine.clone()));

        Ok(Self {
            store,
            backend,
            clock,
            monitor,
            outbox,
            dispatcher,
            engine,
            scheduler,
            policy,
            db_path,
            _dir: dir,
        })
    }

    /// Close the store and reopen the same database file.
    ///
    /// Backend, clock, and connectivity state carry over; everything built on
    /// the store is rebuilt, as after a process restart.
    pub async fn restart(self) -> Result<Self, OutpostError> {
        self.store.close().await?;
        Self::assemble(
            self._dir,
            self.db_path,
            self.backend,
            self.clock,
            self.monitor,
            self.policy,
        )
        .await
    }

    pub async fn write(&self, intent: MutationIntent) -> Result<WriteOutcome, OutpostError> {
        self.dispatcher.write(intent).await
    }

    /// One full pass with the configured batch size.
    pub async fn flush(&self) -> Result<FlushReport, OutpostError> {
        self.engine.flush(None).await
    }

    /// Every pending record, oldest first.
    pub async fn pending(&self) -> Result<Vec<QueuedMutation>, OutpostError> {
        self.store.list_ordered_by_updated_at(usize::MAX).await
    }
}
