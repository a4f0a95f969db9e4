// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The refresh endpoint call.

use serde::{Deserialize, Serialize};

use crate::error::RefreshError;

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

/// Successful refresh response. `refresh` is present only when the backend
/// rotates refresh tokens.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    #[serde(default)]
    pub access: Option<String>,
    #[serde(default)]
    pub refresh: Option<String>,
}

/// New token pair from a single refresh attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedTokens {
    pub access: String,
    pub refresh: Option<String>,
}

/// Perform a single refresh request. Never retried.
pub async fn request_refresh(
    client: &reqwest::Client,
    refresh_url: &str,
    refresh_token: &str,
) -> Result<RefreshedTokens, RefreshError> {
    let resp = client
        .post(refresh_url)
        .json(&RefreshRequest { refresh: refresh_token })
        .send()
        .await
        .map_err(RefreshError::Transport)?;

    let status = resp.status();
    let body = resp.text().await.map_err(RefreshError::Transport)?;

    if !status.is_success() {
        return Err(RefreshError::Rejected { status: status.as_u16(), body });
    }

    let parsed: RefreshResponse = serde_json::from_str(&body).map_err(RefreshError::Malformed)?;
    let access = parsed.access.filter(|a| !a.is_empty()).ok_or(RefreshError::MissingAccess)?;
    Ok(RefreshedTokens { access, refresh: parsed.refresh.filter(|r| !r.is_empty()) })
}
