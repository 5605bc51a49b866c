// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outpost - offline write-durability outbox.
//!
//! This is the binary entry point: queue inspection and repair, one-shot
//! flushes and writes, and a long-running watcher that drains the queue
//! whenever the backend becomes reachable.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod context;
mod flush;
mod mission;
mod output;
mod queue;
mod shutdown;
mod status;
mod watch;
mod write;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use outpost_config::OutpostConfig;
use outpost_core::OutpostError;

use crate::context::Context;

/// Outpost - offline write-durability outbox.
#[derive(Parser, Debug)]
#[command(name = "outpost", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Queue depth, dead letters, and backend reachability.
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Pending records in replay order.
    List {
        #[arg(long, default_value_t = 100)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Remove a pending record without sending it.
    Cancel { id: String },
    /// Run one flush pass against the backend.
    Flush {
        /// Records to replay (defaults to outbox.flush_batch_size).
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Records removed after too many failed replays.
    DeadLetters {
        #[arg(long, default_value_t = 100)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Put a dead letter back in the queue.
    Requeue { id: String },
    /// Drop a dead letter for good.
    Discard { id: String },
    /// Dispatch one mutation, queueing it if the backend cannot take it.
    Write {
        /// Mutation as JSON, e.g. '{"op":"upsert","table":"people","payload":{"id":"p1"}}'.
        mutation: String,
        /// Explicit dedupe key.
        #[arg(long, conflicts_with_all = ["part", "mission_day"])]
        key: Option<String>,
        /// Dedupe key component; the key becomes `target:part1|part2`.
        #[arg(long)]
        part: Vec<String>,
        /// Prefix the key components with today's mission day.
        #[arg(long)]
        mission_day: bool,
        #[arg(long)]
        json: bool,
    },
    /// Print today's mission day.
    Day,
    /// Probe the backend and flush on every reconnect until interrupted.
    Watch,
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("outpost={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Option<OutpostConfig> {
    let loaded = match path {
        Some(path) => outpost_config::load_and_validate_path(path),
        None => outpost_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => Some(config),
        Err(errors) => {
            outpost_config::render_errors(&errors);
            None
        }
    }
}

/// Runs a subcommand. `Ok(false)` means it completed but reports failure.
async fn run(command: Commands, ctx: &Context) -> Result<bool, OutpostError> {
    match command {
        Commands::Status { json } => status::run_status(ctx, json).await.map(|()| true),
        Commands::List { limit, json } => queue::run_list(ctx, limit, json).await.map(|()| true),
        Commands::Cancel { id } => queue::run_cancel(ctx, &id).await,
        Commands::Flush { limit } => flush::run_flush(ctx, limit).await,
        Commands::DeadLetters { limit, json } => {
            queue::run_dead_letters(ctx, limit, json).await.map(|()| true)
        }
        Commands::Requeue { id } => queue::run_requeue(ctx, &id).await,
        Commands::Discard { id } => queue::run_discard(ctx, &id).await,
        Commands::Write {
            mutation,
            key,
            part,
            mission_day,
            json,
        } => {
            let key_source = write::KeySource {
                key,
                parts: part,
                mission_day,
            };
            write::run_write(ctx, &key_source, &mutation, json)
                .await
                .map(|()| true)
        }
        Commands::Day => mission::run_day(ctx).await.map(|()| true),
        Commands::Watch => {
            let shutdown = shutdown::install_signal_handler();
            watch::run_watch(ctx, shutdown).await.map(|()| true)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let Some(config) = load_config(cli.config.as_ref()) else {
        return ExitCode::FAILURE;
    };
    init_tracing(&config.app.log_level);

    let ctx = match Context::open(config).await {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("outpost: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = run(cli.command, &ctx).await;
    if let Err(e) = ctx.close().await {
        tracing::warn!(error = %e, "failed to checkpoint outbox on exit");
    }

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("outpost: {e}");
            ExitCode::FAILURE
        }
    }
}
