// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks semantic constraints serde cannot express: non-empty paths,
//! positive batch sizes, parseable cutoffs, well-formed URLs.

use crate::diagnostic::ConfigError;
use crate::model::OutpostConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &OutpostConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.app.log_level.as_str()) {
        fail(format!(
            "app.log_level `{}` must be one of {}",
            config.app.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    if config.outbox.flush_batch_size == 0 {
        fail("outbox.flush_batch_size must be at least 1".to_string());
    }

    if let Some(url) = &config.backend.url {
        let url = url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            fail(format!(
                "backend.url `{url}` must start with http:// or https://"
            ));
        }
    }

    if config.backend.timeout_secs == 0 {
        fail("backend.timeout_secs must be at least 1".to_string());
    }

    if config.connectivity.probe_interval_secs == 0 {
        fail("connectivity.probe_interval_secs must be at least 1".to_string());
    }

    if !config.connectivity.probe_path.starts_with('/') {
        fail(format!(
            "connectivity.probe_path `{}` must start with `/`",
            config.connectivity.probe_path
        ));
    }

    if parse_cutoff(&config.mission.default_cutoff).is_none() {
        fail(format!(
            "mission.default_cutoff `{}` must be a HH:MM time",
            config.mission.default_cutoff
        ));
    }

    if config.mission.cutoff_setting_key.trim().is_empty() {
        fail("mission.cutoff_setting_key must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Parse a `HH:MM` cutoff into hours and minutes.
pub fn parse_cutoff(value: &str) -> Option<(u32, u32)> {
    let (h, m) = value.trim().split_once(':')?;
    let hours: u32 = h.parse().ok()?;
    let minutes: u32 = m.parse().ok()?;
    (hours < 24 && minutes < 60).then_some((hours, minutes))
}
