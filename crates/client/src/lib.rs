// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rahnum API client: bearer-authenticated requests with single-flight token refresh.
//!
//! [`ApiClient`] attaches the stored access token to every call, refreshes it
//! ahead of expiry, and retries once after a `401`. The refresh machinery lives
//! in [`AuthSession`], which is shared by the dispatcher and a background
//! scheduler so that concurrent callers never trigger more than one refresh.

pub mod claims;
pub mod client;
pub mod config;
pub mod error;
pub mod session;
pub mod store;
pub mod test_support;
pub mod timer;

use std::sync::Once;

pub use crate::client::{ApiClient, ApiRequest, FormData, RequestBody};
pub use crate::config::{ClientConfig, RefreshPolicy};
pub use crate::error::{ApiError, HttpError};
pub use crate::session::AuthSession;
pub use crate::store::{CredentialStore, FileStore, KeyValueStore, MemoryStore, TokenKind};

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Idempotent; only the first call installs the provider.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
