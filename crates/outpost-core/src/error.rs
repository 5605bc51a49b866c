// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Outpost outbox.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The primary error type used across all Outpost adapter traits and core operations.
#[derive(Debug, Error)]
pub enum OutpostError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Durable store errors (database unavailable, query failure, corrupted row).
    ///
    /// On the write path this is the one failure that loses a mutation, so
    /// callers must surface it.
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A remote backend call failed outside of the outbox write/flush paths.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// A mutation intent violates the operation/field contract.
    #[error("invalid mutation: {0}")]
    InvalidMutation(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl OutpostError {
    /// Wraps any error as a storage failure.
    pub fn storage(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Storage { source: err.into() }
    }
}

/// A failed remote backend call.
///
/// Both variants are treated identically by the write dispatcher (the
/// mutation is queued). The distinction only matters for logging.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendError {
    /// The backend answered with a structured application-level error
    /// (constraint violation, permission denial, bad payload, 5xx, ...).
    #[error("backend rejected request ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
        details: Option<String>,
        hint: Option<String>,
    },

    /// The request never produced a response (DNS, connect, timeout, reset).
    #[error("transport failure: {message}")]
    Transport { message: String },

    /// A response arrived but its body could not be decoded.
    #[error("undecodable response: {message}")]
    Decode { message: String },
}

impl BackendError {
    /// Builds an `Api` error with only a status and message.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            code: None,
            message: message.into(),
            details: None,
            hint: None,
        }
    }

    /// Builds a `Transport` error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Whether a later retry has a reasonable chance of succeeding.
    ///
    /// Timeouts, rate limiting, 5xx responses, and transport failures are
    /// transient. Everything else (validation, permissions, conflicts) is
    /// expected to fail again on replay.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Api { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            Self::Transport { .. } => true,
            Self::Decode { .. } => false,
        }
    }
}
