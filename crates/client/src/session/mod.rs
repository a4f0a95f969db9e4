// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer-token session: storage, single-flight refresh, proactive
//! scheduling, and termination.
//!
//! One [`AuthSession`] is shared (via `Arc`) by the request dispatcher and
//! the refresh timer it arms, so both paths go through the same gate.

pub mod gate;
pub mod refresh;
pub mod scheduler;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::claims::expiry_of;
use crate::config::RefreshPolicy;
use crate::session::gate::RefreshGate;
use crate::session::scheduler::ScheduleSlot;
use crate::store::{CredentialStore, TokenKind};
use crate::timer::{Clock, SystemClock, Timer, TokioTimer};

/// Where a session stands right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Missing one or both tokens.
    Unauthenticated,
    /// Token valid and outside the proactive window (or expiry unknown).
    Fresh,
    /// Token expires within the proactive window.
    NearExpiry,
    /// A refresh call is in flight.
    Refreshing,
}

/// Shared credential state plus the refresh machinery around it.
pub struct AuthSession {
    store: CredentialStore,
    http: reqwest::Client,
    refresh_url: String,
    policy: RefreshPolicy,
    clock: Arc<dyn Clock>,
    timer: Arc<dyn Timer>,
    gate: RefreshGate,
    schedule: ScheduleSlot,
}

impl AuthSession {
    /// Session with the system clock, Tokio timers, and default policy.
    pub fn new(
        store: CredentialStore,
        http: reqwest::Client,
        refresh_url: impl Into<String>,
    ) -> Arc<Self> {
        Self::builder(store, http, refresh_url).build()
    }

    pub fn builder(
        store: CredentialStore,
        http: reqwest::Client,
        refresh_url: impl Into<String>,
    ) -> SessionBuilder {
        SessionBuilder {
            store,
            http,
            refresh_url: refresh_url.into(),
            policy: RefreshPolicy::default(),
            clock: Arc::new(SystemClock),
            timer: Arc::new(TokioTimer),
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn policy(&self) -> &RefreshPolicy {
        &self.policy
    }

    pub fn access_token(&self) -> Option<String> {
        self.store.get(TokenKind::Access)
    }

    /// Milliseconds until the access token expires (negative once expired),
    /// or `None` when there is no token or its expiry is unreadable.
    pub fn millis_until_expiry(&self) -> Option<i64> {
        let token = self.access_token()?;
        let expiry = expiry_of(&token)?;
        let expiry = i64::try_from(expiry).unwrap_or(i64::MAX);
        let now = i64::try_from(self.clock.now_ms()).unwrap_or(i64::MAX);
        Some(expiry.saturating_sub(now))
    }

    /// True when the stored token expires within the proactive window.
    pub fn needs_proactive_refresh(&self) -> bool {
        self.millis_until_expiry()
            .is_some_and(|left| left < self.policy.proactive_window.as_millis() as i64)
    }

    pub fn state(&self) -> SessionState {
        if self.gate.in_flight() {
            SessionState::Refreshing
        } else if !self.store.has_session() {
            SessionState::Unauthenticated
        } else if self.needs_proactive_refresh() {
            SessionState::NearExpiry
        } else {
            SessionState::Fresh
        }
    }

    /// Whether a proactive refresh timer is currently armed.
    pub fn is_scheduled(&self) -> bool {
        self.schedule.is_armed()
    }

    /// End the session: drop every stored credential and disarm the timer.
    /// A refresh still in flight is revoked and its result discarded.
    /// Safe to call repeatedly.
    pub fn terminate(&self) {
        self.gate.revoke();
        for kind in [TokenKind::Access, TokenKind::Refresh, TokenKind::Profile, TokenKind::Role] {
            self.store.remove(kind);
        }
        // After the clear, so a concurrent reschedule either sees no token
        // or is cancelled here.
        self.cancel_schedule();
        info!("session terminated");
    }

    /// Persist the credentials from a login or sign-up response and start
    /// the refresh schedule.
    ///
    /// Accepts `access` (or a single `token`), optional `refresh`, and an
    /// optional `user` object whose `role` is cached separately. Returns
    /// `false` if the response carried no access token.
    pub fn adopt_login_response(self: &Arc<Self>, body: &Value) -> bool {
        if let Some(user) = body.get("user").filter(|u| !u.is_null()) {
            self.store.set_profile(user);
            if let Some(role) = user.get("role").and_then(Value::as_str) {
                self.store.set(TokenKind::Role, role);
            }
        }

        let access = ["access", "token"]
            .iter()
            .find_map(|field| body.get(*field).and_then(Value::as_str).filter(|s| !s.is_empty()));
        let Some(access) = access else {
            debug!("login response carried no access token");
            return false;
        };
        self.store.set(TokenKind::Access, access);
        if let Some(refresh) = body.get("refresh").and_then(Value::as_str).filter(|s| !s.is_empty())
        {
            self.store.set(TokenKind::Refresh, refresh);
        }

        info!(has_refresh = self.store.has_session(), "session started");
        self.reschedule();
        true
    }
}

/// Builder for [`AuthSession`] with injectable policy, clock, and timer.
pub struct SessionBuilder {
    store: CredentialStore,
    http: reqwest::Client,
    refresh_url: String,
    policy: RefreshPolicy,
    clock: Arc<dyn Clock>,
    timer: Arc<dyn Timer>,
}

impl SessionBuilder {
    pub fn policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn timer(mut self, timer: Arc<dyn Timer>) -> Self {
        self.timer = timer;
        self
    }

    pub fn build(self) -> Arc<AuthSession> {
        Arc::new(AuthSession {
            store: self.store,
            http: self.http,
            refresh_url: self.refresh_url,
            policy: self.policy,
            clock: self.clock,
            timer: self.timer,
            gate: RefreshGate::new(),
            schedule: ScheduleSlot::default(),
        })
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
