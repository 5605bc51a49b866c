// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the OutboxStore trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use outpost_config::model::StorageConfig;
use outpost_core::types::{DeadLetter, QueuedMutation};
use outpost_core::{Adapter, HealthStatus, OutboxStore, OutpostError};

use crate::database::Database;
use crate::queries;

/// SQLite-backed outbox.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is lazily opened on the first call to
/// [`SqliteOutbox::initialize`].
pub struct SqliteOutbox {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteOutbox {
    /// Create a new SqliteOutbox with the given configuration.
    ///
    /// The database connection is not opened until [`initialize`] is called.
    ///
    /// [`initialize`]: SqliteOutbox::initialize
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Create and initialize in one step.
    pub async fn open(config: StorageConfig) -> Result<Self, OutpostError> {
        let store = Self::new(config);
        store.initialize().await?;
        Ok(store)
    }

    /// Open the database file and run migrations.
    pub async fn initialize(&self) -> Result<(), OutpostError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| OutpostError::Storage {
            source: "outbox already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite outbox initialized");
        Ok(())
    }

    /// Checkpoint the WAL. The connection itself closes on drop.
    pub async fn close(&self) -> Result<(), OutpostError> {
        self.db()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    /// Returns the underlying Database, or an error if not initialized.
    fn db(&self) -> Result<&Database, OutpostError> {
        self.db.get().ok_or_else(|| OutpostError::Storage {
            source: "outbox not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl Adapter for SqliteOutbox {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn health_check(&self) -> Result<HealthStatus, OutpostError> {
        self.db()?.ping().await?;
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl OutboxStore for SqliteOutbox {
    async fn put(&self, record: &QueuedMutation) -> Result<(), OutpostError> {
        queries::outbox::put(self.db()?, record).await
    }

    async fn get(&self, id: &str) -> Result<Option<QueuedMutation>, OutpostError> {
        queries::outbox::get(self.db()?, id).await
    }

    async fn find_by_dedupe_key(
        &self,
        dedupe_key: &str,
    ) -> Result<Vec<QueuedMutation>, OutpostError> {
        queries::outbox::find_by_dedupe_key(self.db()?, dedupe_key).await
    }

    async fn delete(&self, id: &str) -> Result<bool, OutpostError> {
        queries::outbox::delete(self.db()?, id).await
    }

    async fn delete_by_dedupe_key(&self, dedupe_key: &str) -> Result<u64, OutpostError> {
        queries::outbox::delete_by_dedupe_key(self.db()?, dedupe_key).await
    }

    async fn list_ordered_by_updated_at(
        &self,
        limit: usize,
    ) -> Result<Vec<QueuedMutation>, OutpostError> {
        queries::outbox::list_ordered_by_updated_at(self.db()?, limit).await
    }

    async fn count(&self) -> Result<u64, OutpostError> {
        queries::outbox::count(self.db()?).await
    }

    async fn replace_by_dedupe_key(
        &self,
        record: &QueuedMutation,
    ) -> Result<Vec<String>, OutpostError> {
        queries::outbox::replace_by_dedupe_key(self.db()?, record).await
    }

    async fn record_failure(
        &self,
        id: &str,
        message: &str,
        now: i64,
    ) -> Result<Option<QueuedMutation>, OutpostError> {
        queries::outbox::record_failure(self.db()?, id, message, now).await
    }

    // --- Dead letters ---

    async fn dead_letter(&self, id: &str, now: i64) -> Result<Option<DeadLetter>, OutpostError> {
        queries::dead_letter::move_to_dead_letter(self.db()?, id, now).await
    }

    async fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, OutpostError> {
        queries::dead_letter::list(self.db()?, limit).await
    }

    async fn take_dead_letter(&self, id: &str) -> Result<Option<DeadLetter>, OutpostError> {
        queries::dead_letter::take(self.db()?, id).await
    }

    async fn count_dead_letters(&self) -> Result<u64, OutpostError> {
        queries::dead_letter::count(self.db()?).await
    }
}
