// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Write path and replay path of the Outpost offline outbox.
//!
//! - [`Outbox`] collapses intents for the same logical target into one
//!   durable record.
//! - [`WriteDispatcher`] applies a write immediately when online and queues
//!   it otherwise.
//! - [`FlushEngine`] replays queued records in order, halting on the first
//!   failure.
//! - [`FlushScheduler`] starts flush passes on reconnect and never runs two
//!   at once.

pub mod connectivity;
pub mod dispatcher;
pub mod execute;
pub mod flush;
pub mod key;
pub mod outbox;
pub mod probe;
pub mod scheduler;

pub use connectivity::ConnectivityMonitor;
pub use dispatcher::WriteDispatcher;
pub use flush::{FlushEngine, FlushPolicy};
pub use key::dedupe_key_for;
pub use outbox::{Outbox, Requeue};
pub use probe::ReachabilityProbe;
pub use scheduler::FlushScheduler;
