// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types for the PostgREST dialect.

use outpost_core::{BackendError, Filter};
use serde::Deserialize;
use serde_json::Value;

/// PostgREST error body: `{code, message, details, hint}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<Value>,
    #[serde(default)]
    pub hint: Option<Value>,
}

/// Turn a non-2xx response into a structured error.
///
/// Bodies that are not PostgREST errors keep their raw text as the message.
pub(crate) fn api_error(status: u16, body: &str) -> BackendError {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) if parsed.message.is_some() || parsed.code.is_some() => BackendError::Api {
            status,
            message: parsed
                .message
                .unwrap_or_else(|| format!("request failed with status {status}")),
            code: parsed.code,
            details: parsed.details.and_then(text_of),
            hint: parsed.hint.and_then(text_of),
        },
        _ => {
            let text = body.trim();
            let message = if text.is_empty() {
                format!("request failed with status {status}")
            } else {
                text.to_string()
            };
            BackendError::api(status, message)
        }
    }
}

fn text_of(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// Render a filter as a `(column, "op.value")` query pair.
pub(crate) fn filter_pair(filter: &Filter) -> (String, String) {
    match filter {
        Filter::Eq { column, value } => {
            let rendered = match value {
                Value::Null => "is.null".to_string(),
                Value::String(s) => format!("eq.{s}"),
                other => format!("eq.{other}"),
            };
            (column.clone(), rendered)
        }
    }
}
