// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

/// Default API root when nothing is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

/// Configuration for the API client.
#[derive(Debug, Clone, clap::Args)]
pub struct ClientConfig {
    /// API root; endpoint paths are appended verbatim.
    #[arg(long, default_value = DEFAULT_BASE_URL, env = "RAHNUM_API_BASE_URL")]
    pub base_url: String,

    /// Path to the persisted credential file.
    #[arg(long = "credentials", env = "RAHNUM_CREDENTIALS")]
    pub credentials_path: Option<PathBuf>,

    /// Transport timeout per request in milliseconds.
    #[arg(long, default_value_t = 30000, env = "RAHNUM_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// How long before expiry the background refresh fires, in milliseconds.
    #[arg(long, default_value_t = 60000, env = "RAHNUM_REFRESH_LEAD_MS")]
    pub refresh_lead_ms: u64,

    /// Lower bound for the background refresh delay, in milliseconds.
    #[arg(long, default_value_t = 5000, env = "RAHNUM_REFRESH_MIN_DELAY_MS")]
    pub refresh_min_delay_ms: u64,

    /// Requests issued this close to expiry refresh first, in milliseconds.
    #[arg(long, default_value_t = 65000, env = "RAHNUM_PROACTIVE_WINDOW_MS")]
    pub proactive_window_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            credentials_path: None,
            request_timeout_ms: 30000,
            refresh_lead_ms: 60000,
            refresh_min_delay_ms: 5000,
            proactive_window_ms: 65000,
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy {
            lead: Duration::from_millis(self.refresh_lead_ms),
            min_delay: Duration::from_millis(self.refresh_min_delay_ms),
            proactive_window: Duration::from_millis(self.proactive_window_ms),
        }
    }

    /// Resolved credential file path (explicit flag, else under [`state_dir`]).
    pub fn credentials_path(&self) -> PathBuf {
        match self.credentials_path {
            Some(ref path) => path.clone(),
            None => state_dir().join("credentials.json"),
        }
    }

    /// The refresh endpoint under the configured API root.
    pub fn refresh_url(&self) -> String {
        format!("{}/token/refresh/", self.base_url.trim_end_matches('/'))
    }
}

/// Timing constants that drive proactive refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Background refresh fires this long before expiry.
    pub lead: Duration,
    /// Background refresh never waits less than this.
    pub min_delay: Duration,
    /// A request this close to expiry refreshes before it is sent.
    pub proactive_window: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            lead: Duration::from_secs(60),
            min_delay: Duration::from_secs(5),
            proactive_window: Duration::from_secs(65),
        }
    }
}

/// Resolve the state directory for client data.
///
/// Checks `RAHNUM_STATE_DIR`, then `$XDG_STATE_HOME/rahnum`,
/// then `$HOME/.local/state/rahnum`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("RAHNUM_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("rahnum");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/state/rahnum");
    }
    PathBuf::from(".rahnum")
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
