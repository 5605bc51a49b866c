// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules over the outbox database.

pub mod dead_letter;
pub mod outbox;
