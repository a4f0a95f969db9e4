// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use serde_json::Value;

/// Error returned to callers of [`crate::ApiClient`].
#[derive(Debug)]
pub enum ApiError {
    /// Transport-level failure (DNS, connect, timeout). Never retried here.
    Network(reqwest::Error),
    /// The server answered with a non-success status.
    Http(HttpError),
    /// A response declared as JSON could not be parsed.
    Decode { status: u16, source: serde_json::Error },
    /// A multipart part could not be built.
    Form(reqwest::Error),
    /// A request body could not be serialized.
    Encode(serde_json::Error),
}

impl ApiError {
    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http(e) => Some(e.status),
            Self::Decode { status, .. } => Some(*status),
            Self::Network(_) | Self::Form(_) | Self::Encode(_) => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(e) => write!(f, "network error: {e}"),
            Self::Http(e) => write!(f, "{e}"),
            Self::Decode { status, source } => {
                write!(f, "invalid JSON in {status} response: {source}")
            }
            Self::Form(e) => write!(f, "invalid form data: {e}"),
            Self::Encode(e) => write!(f, "encode request body: {e}"),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Network(e) | Self::Form(e) => Some(e),
            Self::Decode { source, .. } | Self::Encode(source) => Some(source),
            Self::Http(_) => None,
        }
    }
}

impl From<HttpError> for ApiError {
    fn from(e: HttpError) -> Self {
        Self::Http(e)
    }
}

/// A non-success response: `{ message, status, data }`.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpError {
    pub message: String,
    pub status: u16,
    /// Parsed response body (JSON, or a string for text bodies).
    pub data: Value,
}

impl HttpError {
    pub fn new(status: u16, data: Value) -> Self {
        let message = error_message(status, &data);
        Self { message, status, data }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}: {}", self.status, self.message)
    }
}

impl std::error::Error for HttpError {}

/// Pick a human-readable message out of an error body.
///
/// Prefers `detail`, then `message`, then the body itself, then the
/// status reason phrase.
pub fn error_message(status: u16, data: &Value) -> String {
    for field in ["detail", "message"] {
        match data.get(field) {
            Some(Value::String(s)) if s.is_empty() => {}
            Some(Value::String(s)) => return s.clone(),
            Some(Value::Null) | None => {}
            Some(v) => return v.to_string(),
        }
    }
    match data {
        Value::String(s) if !s.is_empty() => return s.clone(),
        Value::Null | Value::String(_) => {}
        other => return other.to_string(),
    }
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("API request failed")
        .to_owned()
}

/// Why a refresh attempt failed. Logged by the gate, never surfaced.
#[derive(Debug)]
pub enum RefreshError {
    Transport(reqwest::Error),
    Rejected { status: u16, body: String },
    MissingAccess,
    Malformed(serde_json::Error),
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "HTTP error: {e}"),
            Self::Rejected { status, body } => write!(f, "HTTP {status}: {body}"),
            Self::MissingAccess => f.write_str("refresh response has no access token"),
            Self::Malformed(e) => write!(f, "parse response: {e}"),
        }
    }
}

impl std::error::Error for RefreshError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
