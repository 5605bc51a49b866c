// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `outpost flush` command implementation.

use outpost_core::{FlushReport, OutpostError};

use crate::context::Context;
use crate::output::use_color;

/// Run one pass against the configured backend.
///
/// Returns `false` when the pass did not drain cleanly (backend unreachable
/// or a record failed).
pub async fn run_flush(ctx: &Context, limit: Option<usize>) -> Result<bool, OutpostError> {
    let backend = ctx.require_backend()?;
    let monitor = ctx.connect(backend.clone()).await;
    if !monitor.is_online() {
        eprintln!("backend unreachable, nothing flushed");
        return Ok(false);
    }

    let report = ctx.engine(backend, monitor).flush(limit).await?;
    let remaining = ctx.outbox.len().await?;
    print_report(&report, remaining, use_color());
    Ok(report.is_clean())
}

fn print_report(report: &FlushReport, remaining: u64, use_color: bool) {
    use colored::Colorize;

    println!("flushed {} record(s), {remaining} remaining", report.flushed);
    let Some(failure) = &report.failure else {
        return;
    };
    let headline = if failure.dead_lettered {
        format!(
            "{} moved to dead letters after {} attempts",
            failure.dedupe_key, failure.attempt_count
        )
    } else {
        format!(
            "{} failed (attempt {}), pass halted",
            failure.dedupe_key, failure.attempt_count
        )
    };
    if use_color {
        println!("{}", headline.red());
    } else {
        println!("{headline}");
    }
    println!("  id:    {}", failure.id);
    println!("  error: {}", failure.error);
}
