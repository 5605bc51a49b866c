// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./outpost.toml` > `~/.config/outpost/outpost.toml` > `/etc/outpost/outpost.toml`
//! with environment variable overrides via `OUTPOST_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::OutpostConfig;

/// Section names recognised in `OUTPOST_<SECTION>_<KEY>` variables.
const ENV_SECTIONS: &[&str] = &[
    "app",
    "storage",
    "outbox",
    "backend",
    "connectivity",
    "mission",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/outpost/outpost.toml` (system-wide)
/// 3. `~/.config/outpost/outpost.toml` (user XDG config)
/// 4. `./outpost.toml` (local directory)
/// 5. `OUTPOST_*` environment variables
pub fn load_config() -> Result<OutpostConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<OutpostConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(OutpostConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<OutpostConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(OutpostConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(OutpostConfig::default()))
        .merge(Toml::file("/etc/outpost/outpost.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("outpost/outpost.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("outpost.toml"))
        .merge(env_provider())
}

/// Environment provider mapping only the first underscore to a dot.
///
/// `OUTPOST_OUTBOX_FLUSH_BATCH_SIZE` must become `outbox.flush_batch_size`,
/// not `outbox.flush.batch.size`, so `Env::split("_")` cannot be used.
fn env_provider() -> Env {
    Env::prefixed("OUTPOST_").map(|key| map_env_key(key.as_str()).into())
}

/// Map a lowercased, prefix-stripped env var name to its config path.
pub(crate) fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
