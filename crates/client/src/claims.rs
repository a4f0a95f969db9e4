// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Best-effort access-token claim decoding. No signature checks: the client
//! only needs the expiry to plan refreshes.

use std::fmt;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde_json::Value;

/// URL-safe alphabet, padding optional.
const SEGMENT_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// The claims the client cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub subject: Option<String>,
    /// Expiry as milliseconds since the Unix epoch.
    pub expires_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimsError {
    /// Not three dot-separated segments.
    Segments(usize),
    Base64(String),
    Json(String),
    MissingExpiry,
}

impl fmt::Display for ClaimsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Segments(n) => write!(f, "expected 3 token segments, found {n}"),
            Self::Base64(e) => write!(f, "claims segment is not base64url: {e}"),
            Self::Json(e) => write!(f, "claims segment is not JSON: {e}"),
            Self::MissingExpiry => f.write_str("claims have no numeric exp"),
        }
    }
}

impl std::error::Error for ClaimsError {}

/// Decode the middle segment of a JWT-shaped token.
pub fn decode_claims(token: &str) -> Result<Claims, ClaimsError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(ClaimsError::Segments(segments.len()));
    }
    let raw = SEGMENT_ENGINE
        .decode(segments[1])
        .map_err(|e| ClaimsError::Base64(e.to_string()))?;
    let value: Value = serde_json::from_slice(&raw).map_err(|e| ClaimsError::Json(e.to_string()))?;

    let exp_secs = value.get("exp").and_then(Value::as_f64).ok_or(ClaimsError::MissingExpiry)?;
    if !exp_secs.is_finite() || exp_secs < 0.0 {
        return Err(ClaimsError::MissingExpiry);
    }
    let subject = match value.get("sub") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    Ok(Claims { subject, expires_at_ms: (exp_secs * 1000.0) as u64 })
}

/// Token expiry in epoch milliseconds, or `None` when it cannot be read.
pub fn expiry_of(token: &str) -> Option<u64> {
    decode_claims(token).ok().map(|c| c.expires_at_ms)
}

#[cfg(test)]
#[path = "claims_tests.rs"]
mod tests;
