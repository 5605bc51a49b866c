// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! The outbox talks to its durable store and to the remote backend only
//! through these traits, so either side can be swapped for a mock in tests.
//! All adapters extend [`Adapter`] and use `#[async_trait]` for dynamic
//! dispatch compatibility.

pub mod adapter;
pub mod backend;
pub mod clock;
pub mod store;

pub use adapter::Adapter;
pub use backend::RemoteBackend;
pub use clock::{Clock, SystemClock};
pub use store::OutboxStore;
