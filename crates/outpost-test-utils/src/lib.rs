// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Outpost integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic tests without a real backend.
//!
//! # Components
//!
//! - [`MockBackend`] - In-memory tables with conflict-target upserts and failure injection
//! - [`ManualClock`] - Clock that only moves when told to
//! - [`FaultyStore`] - Store wrapper that fails chosen operations
//! - [`TestHarness`] - Full outbox stack over a temp SQLite file

pub mod clock;
pub mod faulty_store;
pub mod harness;
pub mod mock_backend;

pub use clock::ManualClock;
pub use faulty_store::FaultyStore;
pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_backend::{MockBackend, RecordedCall};

use std::sync::Arc;

use outpost_config::model::StorageConfig;
use outpost_storage::SqliteOutbox;
use tempfile::TempDir;

/// Open a fresh SQLite outbox in a temp directory.
///
/// Keep the returned [`TempDir`] alive for as long as the store is used.
///
/// # Panics
///
/// Panics if the directory or database cannot be created.
pub async fn temp_store() -> (Arc<SqliteOutbox>, TempDir) {
    let dir = TempDir::new().expect("create temp dir");
    let config = StorageConfig {
        database_path: dir.path().join("outbox.db").to_string_lossy().into_owned(),
        wal_mode: true,
    };
    let store = SqliteOutbox::open(config).await.expect("open temp outbox");
    (Arc::new(store), dir)
}
