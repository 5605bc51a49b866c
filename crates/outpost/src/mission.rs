// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mission-day lookup for the CLI.

use chrono::{Local, NaiveDate, NaiveTime};
use outpost_config::validation::parse_cutoff;
use outpost_core::OutpostError;
use outpost_remote::{CutoffCache, format_mission_day, mission_day};

use crate::context::Context;

/// Today's mission day, using the backend's cutoff when one is configured
/// and reachable, otherwise `mission.default_cutoff`.
pub async fn current_mission_day(ctx: &Context) -> Result<NaiveDate, OutpostError> {
    match ctx.backend()? {
        Some(backend) => {
            let cache = CutoffCache::new(&ctx.config.mission, backend, ctx.clock.clone())?;
            cache.current_mission_day().await
        }
        None => {
            let cutoff = default_cutoff(&ctx.config.mission.default_cutoff)?;
            Ok(mission_day(Local::now().naive_local(), cutoff))
        }
    }
}

fn default_cutoff(raw: &str) -> Result<NaiveTime, OutpostError> {
    parse_cutoff(raw)
        .and_then(|(h, m)| NaiveTime::from_hms_opt(h, m, 0))
        .ok_or_else(|| OutpostError::Config(format!("mission.default_cutoff `{raw}` must be a HH:MM time")))
}

pub async fn run_day(ctx: &Context) -> Result<(), OutpostError> {
    let day = current_mission_day(ctx).await?;
    println!("{}  ({day})", format_mission_day(&day.to_string()));
    Ok(())
}
