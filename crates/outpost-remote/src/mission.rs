// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mission-day arithmetic and the remotely configured cutoff.
//!
//! Field shifts run past midnight, so a "mission day" starts at a cutoff
//! time (05:00 unless the backend says otherwise) rather than at 00:00.
//! Day-scoped dedupe keys embed the mission day, which keeps a 02:00 edit
//! on the same record as the 22:00 edit before it.

use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime};
use outpost_config::model::MissionConfig;
use outpost_config::validation::parse_cutoff;
use outpost_core::{Clock, OutpostError};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::settings::SettingsSource;

/// The mission day `now` belongs to: local times before `cutoff` count
/// towards the previous calendar day.
pub fn mission_day(now: NaiveDateTime, cutoff: NaiveTime) -> NaiveDate {
    let date = now.date();
    if now.time() < cutoff {
        date.pred_opt().unwrap_or(date)
    } else {
        date
    }
}

/// Render `YYYY-MM-DD` as `DD/MM/YYYY`.
///
/// Empty input renders as an em dash placeholder; anything that does not
/// split into three dash-separated parts is returned unchanged.
pub fn format_mission_day(day: &str) -> String {
    if day.is_empty() {
        return "\u{2014}".to_string();
    }
    match day.split('-').collect::<Vec<_>>().as_slice() {
        [y, m, d] => format!("{d}/{m}/{y}"),
        _ => day.to_string(),
    }
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    let (h, m) = parse_cutoff(value)?;
    NaiveTime::from_hms_opt(h, m, 0)
}

#[derive(Debug, Clone, Copy)]
struct Cached {
    cutoff: NaiveTime,
    fetched_at: i64,
}

/// Time-bounded cache of the mission-day cutoff setting.
///
/// Concurrent callers that find the cache stale share one fetch: the lock is
/// held across the request, so later callers wake up to a fresh entry.
pub struct CutoffCache {
    source: Arc<dyn SettingsSource>,
    clock: Arc<dyn Clock>,
    key: String,
    default: NaiveTime,
    ttl_millis: i64,
    cached: Mutex<Option<Cached>>,
}

impl CutoffCache {
    pub fn new(
        config: &MissionConfig,
        source: Arc<dyn SettingsSource>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, OutpostError> {
        let default = parse_time(&config.default_cutoff).ok_or_else(|| {
            OutpostError::Config(format!(
                "mission.default_cutoff `{}` must be a HH:MM time",
                config.default_cutoff
            ))
        })?;
        Ok(Self {
            source,
            clock,
            key: config.cutoff_setting_key.clone(),
            default,
            ttl_millis: i64::try_from(config.cutoff_ttl_secs)
                .unwrap_or(i64::MAX / 1000)
                .saturating_mul(1000),
            cached: Mutex::new(None),
        })
    }

    /// The current cutoff, refreshed from the backend once the TTL lapses.
    ///
    /// A fetch error returns the last known value (or the default) without
    /// caching it, so the next call retries. A missing or malformed setting
    /// caches the default.
    pub async fn cutoff(&self) -> NaiveTime {
        let mut cached = self.cached.lock().await;
        let now = self.clock.now_millis();

        if let Some(entry) = *cached {
            if now.saturating_sub(entry.fetched_at) < self.ttl_millis {
                return entry.cutoff;
            }
        }

        match self.source.fetch_setting(&self.key).await {
            Ok(value) => {
                let cutoff = value
                    .as_ref()
                    .and_then(|v| v.get("cutoff"))
                    .and_then(Value::as_str)
                    .and_then(|raw| {
                        let parsed = parse_time(raw);
                        if parsed.is_none() {
                            warn!(key = %self.key, value = raw, "malformed cutoff setting, using default");
                        }
                        parsed
                    })
                    .unwrap_or(self.default);
                debug!(key = %self.key, %cutoff, "mission cutoff refreshed");
                *cached = Some(Cached {
                    cutoff,
                    fetched_at: self.clock.now_millis(),
                });
                cutoff
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "failed to fetch mission cutoff");
                (*cached).map(|entry| entry.cutoff).unwrap_or(self.default)
            }
        }
    }

    /// Mission day for a local wall-clock time.
    pub async fn mission_day_at(&self, now: NaiveDateTime) -> NaiveDate {
        mission_day(now, self.cutoff().await)
    }

    /// Mission day for the clock's current instant in the local time zone.
    pub async fn current_mission_day(&self) -> Result<NaiveDate, OutpostError> {
        let millis = self.clock.now_millis();
        let now = DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| OutpostError::Internal(format!("clock out of range: {millis}")))?
            .with_timezone(&Local)
            .naive_local();
        Ok(self.mission_day_at(now).await)
    }
}
