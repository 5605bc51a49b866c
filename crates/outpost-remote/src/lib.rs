// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Remote side of the Outpost outbox.
//!
//! [`RestBackend`] replays mutations against a PostgREST-compatible HTTP API
//! and doubles as the reachability probe target. [`mission`] derives the
//! mission day that dedupe keys for day-scoped rows are built from.

pub mod client;
pub mod mission;
pub mod settings;
mod types;

pub use client::RestBackend;
pub use mission::{CutoffCache, format_mission_day, mission_day};
pub use settings::SettingsSource;
