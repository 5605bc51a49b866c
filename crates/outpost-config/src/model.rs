// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Outpost outbox.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Outpost configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OutpostConfig {
    /// Application identity and logging.
    #[serde(default)]
    pub app: AppConfig,

    /// Durable store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Queue replay policy.
    #[serde(default)]
    pub outbox: OutboxConfig,

    /// Remote backend endpoint and credentials.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Reachability probe settings.
    #[serde(default)]
    pub connectivity: ConnectivityConfig,

    /// Mission-day cutoff lookup.
    #[serde(default)]
    pub mission: MissionConfig,
}

/// Application identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Display name used in log lines.
    #[serde(default = "default_app_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_app_name() -> String {
    "outpost".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Durable store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("outpost").join("outpost.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("outpost.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Queue replay policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OutboxConfig {
    /// Maximum records replayed per flush pass.
    #[serde(default = "default_flush_batch_size")]
    pub flush_batch_size: usize,

    /// Failed replays after which a record moves to the dead-letter table.
    /// `0` keeps failing records in the outbox forever.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            flush_batch_size: default_flush_batch_size(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_flush_batch_size() -> usize {
    50
}

fn default_max_attempts() -> u32 {
    10
}

/// Remote backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Base URL of the PostgREST-compatible backend. `None` keeps the outbox
    /// local-only (writes always queue, flushes are refused).
    #[serde(default)]
    pub url: Option<String>,

    /// API key sent as `apikey` and bearer token.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

/// Reachability probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectivityConfig {
    /// Seconds between reachability probes in `outpost watch`.
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,

    /// Path requested on the backend to decide whether it is reachable.
    #[serde(default = "default_probe_path")]
    pub probe_path: String,

    /// Timeout for a single probe request.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: default_probe_interval_secs(),
            probe_path: default_probe_path(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

fn default_probe_interval_secs() -> u64 {
    15
}

fn default_probe_path() -> String {
    "/rest/v1/".to_string()
}

fn default_probe_timeout_secs() -> u64 {
    3
}

/// Mission-day cutoff configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MissionConfig {
    /// Key of the row in `app_settings` holding `{"cutoff": "HH:MM"}`.
    #[serde(default = "default_cutoff_setting_key")]
    pub cutoff_setting_key: String,

    /// Cutoff used when the backend has no value or cannot be reached.
    #[serde(default = "default_cutoff")]
    pub default_cutoff: String,

    /// How long a fetched cutoff is trusted, in seconds.
    #[serde(default = "default_cutoff_ttl_secs")]
    pub cutoff_ttl_secs: u64,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            cutoff_setting_key: default_cutoff_setting_key(),
            default_cutoff: default_cutoff(),
            cutoff_ttl_secs: default_cutoff_ttl_secs(),
        }
    }
}

fn default_cutoff_setting_key() -> String {
    "mission_day_cutoff".to_string()
}

fn default_cutoff() -> String {
    "05:00".to_string()
}

fn default_cutoff_ttl_secs() -> u64 {
    600
}
