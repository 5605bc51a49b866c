// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared online/offline state with reconnect notification.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

/// Snapshot published to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityState {
    pub online: bool,
    /// Number of offline-to-online transitions so far.
    ///
    /// Subscribers compare this counter instead of the flag, so a reconnect
    /// is never lost when a quick drop-and-return coalesces into one wakeup.
    pub reconnects: u64,
}

/// Cloneable handle to the current connectivity state.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<ConnectivityState>>,
}

impl ConnectivityMonitor {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(ConnectivityState {
            online,
            reconnects: 0,
        });
        Self { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        self.tx.borrow().online
    }

    pub fn state(&self) -> ConnectivityState {
        *self.tx.borrow()
    }

    /// Record the latest connectivity observation.
    ///
    /// Returns `true` only for an offline-to-online transition.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|state| {
            if state.online == online {
                return false;
            }
            state.online = online;
            if online {
                state.reconnects += 1;
            }
            true
        });

        match (changed, online) {
            (true, true) => info!("connectivity restored"),
            (true, false) => warn!("connectivity lost"),
            _ => {}
        }
        changed && online
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.tx.subscribe()
    }
}
