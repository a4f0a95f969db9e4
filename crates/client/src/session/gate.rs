// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight refresh: at most one refresh call runs at a time and every
//! concurrent caller observes its outcome.

use std::sync::{Arc, Weak};

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::session::refresh::request_refresh;
use crate::session::AuthSession;
use crate::store::TokenKind;

type Outcome = Shared<BoxFuture<'static, bool>>;

enum GateState {
    Idle,
    InFlight { generation: u64, outcome: Outcome },
}

struct GateInner {
    state: GateState,
    next_generation: u64,
}

/// Guard for the one in-flight refresh. Check-and-set happens under a lock
/// that is never held across an await.
pub(crate) struct RefreshGate {
    inner: Mutex<GateInner>,
}

impl RefreshGate {
    pub(crate) fn new() -> Self {
        Self { inner: Mutex::new(GateInner { state: GateState::Idle, next_generation: 0 }) }
    }

    pub(crate) fn in_flight(&self) -> bool {
        matches!(self.inner.lock().state, GateState::InFlight { .. })
    }

    /// Return to idle, unless a newer attempt has already taken the slot.
    /// Returns whether `generation` was still the current attempt.
    fn finish(&self, generation: u64) -> bool {
        let mut inner = self.inner.lock();
        Self::release(&mut inner, generation)
    }

    /// Run `write` and return to idle, atomically, only if `generation` is
    /// still current. A revoked attempt leaves storage alone.
    fn commit(&self, generation: u64, write: impl FnOnce()) -> bool {
        let mut inner = self.inner.lock();
        let current = Self::release(&mut inner, generation);
        if current {
            write();
        }
        current
    }

    /// Detach the in-flight attempt so its result is discarded on arrival.
    /// Callers already waiting on it observe `false`.
    pub(crate) fn revoke(&self) {
        let mut inner = self.inner.lock();
        if let GateState::InFlight { generation, .. } = inner.state {
            debug!(generation, "in-flight refresh revoked");
            inner.state = GateState::Idle;
        }
    }

    fn release(inner: &mut GateInner, generation: u64) -> bool {
        let current =
            matches!(inner.state, GateState::InFlight { generation: g, .. } if g == generation);
        if current {
            inner.state = GateState::Idle;
        }
        current
    }
}

/// Waiter-side view of a spawned refresh. A task that panics or is aborted
/// still reopens the gate.
fn settle(session: Weak<AuthSession>, generation: u64, task: JoinHandle<bool>) -> Outcome {
    async move {
        match task.await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                warn!(generation, err = %e, "refresh task did not complete");
                if let Some(session) = session.upgrade() {
                    session.gate.finish(generation);
                }
                false
            }
        }
    }
    .boxed()
    .shared()
}

impl AuthSession {
    /// Refresh the access token, joining an attempt already in flight.
    ///
    /// Returns `false` without a network call when no refresh token is
    /// stored. A failed refresh ends the session.
    pub async fn attempt_refresh(self: &Arc<Self>) -> bool {
        let outcome = {
            let mut guard = self.gate.inner.lock();
            let inner: &mut GateInner = &mut guard;
            match inner.state {
                GateState::InFlight { ref outcome, .. } => {
                    debug!("refresh already in flight, joining");
                    outcome.clone()
                }
                GateState::Idle => {
                    let Some(refresh_token) = self.store.get(TokenKind::Refresh) else {
                        debug!("no refresh token stored, nothing to refresh");
                        return false;
                    };
                    inner.next_generation += 1;
                    let generation = inner.next_generation;

                    // Spawned so the call completes even if every waiter is dropped.
                    let session = Arc::clone(self);
                    let task = tokio::spawn(async move {
                        session.run_refresh(generation, refresh_token).await
                    });
                    let outcome = settle(Arc::downgrade(self), generation, task);
                    inner.state = GateState::InFlight { generation, outcome: outcome.clone() };
                    outcome
                }
            }
        };
        outcome.await
    }

    async fn run_refresh(self: Arc<Self>, generation: u64, refresh_token: String) -> bool {
        debug!(generation, "refreshing access token");
        match request_refresh(&self.http, &self.refresh_url, &refresh_token).await {
            Ok(tokens) => {
                let committed = self.gate.commit(generation, || {
                    self.store.set(TokenKind::Access, &tokens.access);
                    match tokens.refresh {
                        Some(ref rotated) => self.store.set(TokenKind::Refresh, rotated),
                        None => debug!("refresh response kept the existing refresh token"),
                    }
                });
                if !committed {
                    debug!(generation, "session ended during refresh, tokens discarded");
                    return false;
                }
                info!(generation, "access token refreshed");
                self.reschedule();
                true
            }
            Err(e) => {
                if !self.gate.finish(generation) {
                    debug!(generation, err = %e, "revoked refresh failed");
                    return false;
                }
                warn!(generation, err = %e, "token refresh failed, ending session");
                self.terminate();
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod tests;
