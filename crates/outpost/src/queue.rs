// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue inspection and manual repair: `list`, `cancel`, `dead-letters`,
//! `requeue`, `discard`.

use outpost_core::OutpostError;
use outpost_sync::Requeue;

use crate::context::Context;
use crate::output::{RecordSummary, print_json, print_records, use_color};

/// Pending records in replay order.
pub async fn run_list(ctx: &Context, limit: usize, json: bool) -> Result<(), OutpostError> {
    let records = ctx.outbox.pending(limit).await?;
    let summaries: Vec<RecordSummary> = records.iter().map(RecordSummary::from).collect();
    if json {
        print_json(&summaries);
    } else if summaries.is_empty() {
        println!("outbox is empty");
    } else {
        print_records(&summaries, use_color());
    }
    Ok(())
}

/// Returns `false` when no pending record has this id.
pub async fn run_cancel(ctx: &Context, id: &str) -> Result<bool, OutpostError> {
    let cancelled = ctx.outbox.cancel(id).await?;
    if cancelled {
        println!("cancelled {id}");
    } else {
        eprintln!("no pending record with id {id}");
    }
    Ok(cancelled)
}

pub async fn run_dead_letters(ctx: &Context, limit: usize, json: bool) -> Result<(), OutpostError> {
    let letters = ctx.outbox.dead_letters(limit).await?;
    let summaries: Vec<RecordSummary> = letters.iter().map(RecordSummary::from).collect();
    if json {
        print_json(&summaries);
    } else if summaries.is_empty() {
        println!("no dead letters");
    } else {
        print_records(&summaries, use_color());
    }
    Ok(())
}

/// Returns `false` when no dead letter has this id.
pub async fn run_requeue(ctx: &Context, id: &str) -> Result<bool, OutpostError> {
    match ctx.outbox.requeue(id).await? {
        Requeue::Requeued { id: new_id } => println!("requeued {id} as {new_id}"),
        Requeue::Superseded { pending_id } => {
            println!("dropped {id}: superseded by pending record {pending_id}");
        }
        Requeue::NotFound => {
            eprintln!("no dead letter with id {id}");
            return Ok(false);
        }
    }
    Ok(true)
}

/// Returns `false` when no dead letter has this id.
pub async fn run_discard(ctx: &Context, id: &str) -> Result<bool, OutpostError> {
    let discarded = ctx.outbox.discard(id).await?;
    if discarded {
        println!("discarded {id}");
    } else {
        eprintln!("no dead letter with id {id}");
    }
    Ok(discarded)
}
