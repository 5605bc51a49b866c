// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `outpost watch`: keep the outbox draining while the process runs.
//!
//! The reachability probe feeds the connectivity monitor; the scheduler
//! flushes once at start and again on every reconnect. Shutdown waits for a
//! running pass to finish.

use std::sync::Arc;

use outpost_core::OutpostError;
use outpost_sync::{ConnectivityMonitor, FlushScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::context::Context;

pub async fn run_watch(ctx: &Context, shutdown: CancellationToken) -> Result<(), OutpostError> {
    let backend = ctx.require_backend()?;
    let monitor = ConnectivityMonitor::new(false);

    let probe = ctx.probe(backend.clone(), monitor.clone()).spawn(shutdown.clone());
    let scheduler = Arc::new(FlushScheduler::new(Arc::new(
        ctx.engine(backend, monitor.clone()),
    )));
    let scheduler = scheduler.spawn(monitor, shutdown.clone());

    info!(
        pending = ctx.outbox.len().await?,
        interval_secs = ctx.config.connectivity.probe_interval_secs,
        "watching outbox"
    );
    shutdown.cancelled().await;

    for (task, handle) in [("probe", probe), ("scheduler", scheduler)] {
        if let Err(e) = handle.await {
            error!(task, error = %e, "background task ended abnormally");
        }
    }
    info!(pending = ctx.outbox.len().await?, "watcher stopped");
    Ok(())
}
