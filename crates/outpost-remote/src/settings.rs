// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Remote key/value settings.

use async_trait::async_trait;
use outpost_core::BackendError;
use serde_json::Value;

/// Reads a row of the backend's `app_settings` table.
#[async_trait]
pub trait SettingsSource: Send + Sync + 'static {
    /// The `value` column for `key`, or `None` if no row exists.
    async fn fetch_setting(&self, key: &str) -> Result<Option<Value>, BackendError>;
}
