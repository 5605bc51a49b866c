// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Human and JSON rendering helpers shared by the subcommands.

use std::io::IsTerminal;

use chrono::{DateTime, Local};
use outpost_core::{DeadLetter, QueuedMutation};
use serde::Serialize;

/// Flat view of a queued record for listings and `--json` output.
#[derive(Debug, Serialize)]
pub struct RecordSummary {
    pub id: String,
    pub dedupe_key: String,
    pub op: String,
    pub target: String,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dead_at: Option<String>,
}

impl From<&QueuedMutation> for RecordSummary {
    fn from(record: &QueuedMutation) -> Self {
        Self {
            id: record.id.clone(),
            dedupe_key: record.dedupe_key.clone(),
            op: record.mutation.operation().to_string(),
            target: record.mutation.target().to_string(),
            attempt_count: record.attempt_count,
            last_error: record.last_error.clone(),
            created_at: format_timestamp(record.created_at),
            updated_at: format_timestamp(record.updated_at),
            dead_at: None,
        }
    }
}

impl From<&DeadLetter> for RecordSummary {
    fn from(letter: &DeadLetter) -> Self {
        Self {
            dead_at: Some(format_timestamp(letter.dead_at)),
            ..Self::from(&letter.record)
        }
    }
}

/// Local wall-clock rendering of epoch milliseconds.
pub fn format_timestamp(millis: i64) -> String {
    match DateTime::from_timestamp_millis(millis) {
        Some(at) => at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
        None => millis.to_string(),
    }
}

/// Coarse age of a timestamp relative to `now`, e.g. `1d 2h`, `3m`.
pub fn format_age(now_millis: i64, then_millis: i64) -> String {
    let secs = now_millis.saturating_sub(then_millis).max(0) / 1000;
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;

    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m")
    } else {
        format!("{secs}s")
    }
}

pub fn use_color() -> bool {
    std::io::stdout().is_terminal()
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
    );
}

/// One line per record, aligned for a terminal.
pub fn print_records(records: &[RecordSummary], use_color: bool) {
    for r in records {
        let error = r.last_error.as_deref().unwrap_or("");
        if use_color {
            use colored::Colorize;
            println!(
                "  {}  {:<7} {:<24} {:<32} attempts={} {}",
                r.id.dimmed(),
                r.op,
                r.target,
                r.dedupe_key.bold(),
                r.attempt_count,
                error.red()
            );
        } else {
            println!(
                "  {}  {:<7} {:<24} {:<32} attempts={} {}",
                r.id, r.op, r.target, r.dedupe_key, r.attempt_count, error
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpost_core::Mutation;
    use serde_json::json;

    #[test]
    fn format_age_picks_largest_units() {
        assert_eq!(format_age(45_000, 0), "45s");
        assert_eq!(format_age(180_000, 0), "3m");
        assert_eq!(format_age(3_720_000, 0), "1h 2m");
        assert_eq!(format_age(93_600_000, 0), "1d 2h");
    }

    #[test]
    fn format_age_clamps_future_timestamps() {
        assert_eq!(format_age(0, 10_000), "0s");
    }

    #[test]
    fn dead_letter_summary_carries_dead_at() {
        let record = QueuedMutation {
            id: "a".into(),
            dedupe_key: "people:p1".into(),
            mutation: Mutation::upsert("people", json!({"id": "p1"})),
            created_at: 0,
            updated_at: 0,
            attempt_count: 10,
            last_error: Some("boom".into()),
        };
        let pending = RecordSummary::from(&record);
        assert_eq!(pending.op, "upsert");
        assert!(pending.dead_at.is_none());
        let json = serde_json::to_value(&pending).unwrap();
        assert!(json.get("dead_at").is_none());

        let dead = RecordSummary::from(&DeadLetter { record, dead_at: 0 });
        assert!(dead.dead_at.is_some());
        assert_eq!(dead.attempt_count, 10);
    }
}
