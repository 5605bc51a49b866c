// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `outpost status` command implementation.
//!
//! Reports the queue depth, dead-letter count, the oldest pending record,
//! and (when a backend is configured) whether it answers the probe.

use outpost_core::{Clock, OutpostError, QueuedMutation};
use serde::Serialize;

use crate::context::Context;
use crate::output::{RecordSummary, format_age, print_json, use_color};

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub database_path: String,
    pub pending: u64,
    pub dead_letters: u64,
    pub oldest: Option<RecordSummary>,
    pub backend_url: Option<String>,
    pub reachable: Option<bool>,
}

pub async fn run_status(ctx: &Context, json: bool) -> Result<(), OutpostError> {
    let pending = ctx.outbox.len().await?;
    let dead_letters = ctx.outbox.dead_letter_count().await?;
    let oldest: Option<QueuedMutation> = ctx.outbox.pending(1).await?.into_iter().next();

    let reachable = match ctx.backend()? {
        Some(backend) => Some(ctx.connect(backend).await.is_online()),
        None => None,
    };

    let response = StatusResponse {
        database_path: ctx.config.storage.database_path.clone(),
        pending,
        dead_letters,
        oldest: oldest.as_ref().map(RecordSummary::from),
        backend_url: ctx.config.backend.url.clone(),
        reachable,
    };

    if json {
        print_json(&response);
    } else {
        let oldest_age = oldest
            .as_ref()
            .map(|r| format_age(ctx.clock.now_millis(), r.updated_at));
        print_status(&response, oldest_age.as_deref(), use_color());
    }
    Ok(())
}

fn print_status(status: &StatusResponse, oldest_age: Option<&str>, use_color: bool) {
    use colored::Colorize;

    println!();
    println!("  outpost status");
    println!("  {}", "-".repeat(35));
    println!("    Database:     {}", status.database_path);

    let pending = status.pending.to_string();
    if use_color && status.pending > 0 {
        println!("    Pending:      {}", pending.yellow());
    } else {
        println!("    Pending:      {pending}");
    }

    let dead = status.dead_letters.to_string();
    if use_color && status.dead_letters > 0 {
        println!("    Dead letters: {}", dead.red());
    } else {
        println!("    Dead letters: {dead}");
    }

    if let (Some(oldest), Some(age)) = (&status.oldest, oldest_age) {
        println!("    Oldest:       {} ({age} ago)", oldest.dedupe_key);
        if let Some(error) = &oldest.last_error {
            println!("    Last error:   {error}");
        }
    }

    match (&status.backend_url, status.reachable) {
        (Some(url), Some(true)) if use_color => {
            println!("    Backend:      {} {url}", "✓".green());
        }
        (Some(url), Some(true)) => println!("    Backend:      [OK] {url}"),
        (Some(url), _) if use_color => {
            println!("    Backend:      {} {url} (unreachable)", "✗".red());
        }
        (Some(url), _) => println!("    Backend:      [FAIL] {url} (unreachable)"),
        (None, _) => println!("    Backend:      not configured (local-only)"),
    }
    println!();
}
