// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Outpost offline outbox.
//!
//! This crate provides the mutation data model, error types, and the adapter
//! traits that the storage, remote, and sync crates implement or consume.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{BackendError, OutpostError};
pub use types::{
    DeadLetter, Filter, FlushFailure, FlushReport, HealthStatus, Mutation, MutationIntent,
    MutationParts, Operation, QueuedMutation, WriteOutcome,
};

pub use traits::{Adapter, Clock, OutboxStore, RemoteBackend, SystemClock};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_round_trips_through_strings() {
        use std::str::FromStr;

        let variants = [
            Operation::Insert,
            Operation::Upsert,
            Operation::Update,
            Operation::Delete,
            Operation::Rpc,
        ];

        for variant in &variants {
            let s = variant.to_string();
            assert_eq!(s, s.to_lowercase());
            let parsed = Operation::from_str(&s).expect("should parse back");
            assert_eq!(*variant, parsed);
        }
        assert!(Operation::from_str("merge").is_err());
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now_millis() > 1_577_836_800_000);
    }

    #[test]
    fn all_traits_are_exported() {
        fn _assert_store<T: OutboxStore>() {}
        fn _assert_backend<T: RemoteBackend>() {}
        fn _assert_clock<T: Clock>() {}
        fn _assert_object_safe(_: &dyn OutboxStore, _: &dyn RemoteBackend, _: &dyn Clock) {}
    }
}
