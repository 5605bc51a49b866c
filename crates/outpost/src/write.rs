// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `outpost write` command implementation.

use outpost_core::{Mutation, MutationIntent, OutpostError, WriteOutcome};
use outpost_sync::dedupe_key_for;
use serde::Serialize;

use crate::context::Context;
use crate::mission::current_mission_day;
use crate::output::print_json;

/// How the dedupe key of a CLI write is chosen.
#[derive(Debug, Clone)]
pub struct KeySource {
    /// Explicit key; wins over `parts`.
    pub key: Option<String>,
    pub parts: Vec<String>,
    /// Prefix the parts with today's mission day.
    pub mission_day: bool,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum WriteResponse<'a> {
    Applied {
        dedupe_key: &'a str,
        data: &'a serde_json::Value,
    },
    Queued {
        dedupe_key: &'a str,
        id: &'a str,
        error: Option<String>,
    },
}

/// Parse a mutation from its JSON form, e.g.
/// `{"op":"upsert","table":"people","payload":{...}}`.
pub fn parse_mutation(raw: &str) -> Result<Mutation, OutpostError> {
    let mutation: Mutation = serde_json::from_str(raw)
        .map_err(|e| OutpostError::InvalidMutation(format!("cannot parse mutation: {e}")))?;
    mutation.validate()?;
    Ok(mutation)
}

async fn resolve_key(
    ctx: &Context,
    key_source: &KeySource,
    mutation: &Mutation,
) -> Result<String, OutpostError> {
    if let Some(key) = &key_source.key {
        return Ok(key.clone());
    }
    let mut parts = Vec::with_capacity(key_source.parts.len() + 1);
    if key_source.mission_day {
        parts.push(current_mission_day(ctx).await?.to_string());
    }
    parts.extend(key_source.parts.iter().cloned());
    if parts.is_empty() {
        return Err(OutpostError::InvalidMutation(
            "a dedupe key needs --key, --part, or --mission-day".into(),
        ));
    }
    Ok(dedupe_key_for(mutation.target(), &parts))
}

/// Dispatch one intent. Without a configured backend it is queued directly.
pub async fn run_write(
    ctx: &Context,
    key_source: &KeySource,
    raw_mutation: &str,
    json: bool,
) -> Result<(), OutpostError> {
    let mutation = parse_mutation(raw_mutation)?;
    let dedupe_key = resolve_key(ctx, key_source, &mutation).await?;
    let intent = MutationIntent::new(dedupe_key.clone(), mutation);

    let outcome = match ctx.backend()? {
        Some(backend) => {
            let monitor = ctx.connect(backend.clone()).await;
            ctx.dispatcher(backend, monitor).write(intent).await?
        }
        None => WriteOutcome::Queued {
            id: ctx.outbox.enqueue(intent).await?,
            error: None,
        },
    };

    let response = match &outcome {
        WriteOutcome::Applied { data } => WriteResponse::Applied {
            dedupe_key: &dedupe_key,
            data,
        },
        WriteOutcome::Queued { id, error } => WriteResponse::Queued {
            dedupe_key: &dedupe_key,
            id,
            error: error.as_ref().map(ToString::to_string),
        },
    };
    if json {
        print_json(&response);
    } else {
        match response {
            WriteResponse::Applied { dedupe_key, .. } => println!("applied {dedupe_key}"),
            WriteResponse::Queued {
                dedupe_key,
                id,
                error: Some(error),
            } => println!("queued {dedupe_key} as {id} ({error})"),
            WriteResponse::Queued { dedupe_key, id, .. } => {
                println!("queued {dedupe_key} as {id}");
            }
        }
    }
    Ok(())
}
