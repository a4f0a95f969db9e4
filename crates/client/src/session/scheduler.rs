// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Proactive refresh: one timer per session, armed shortly before the access
//! token expires and re-armed after every refresh.

use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use parking_lot::Mutex;
use tracing::debug;

use crate::claims::expiry_of;
use crate::config::RefreshPolicy;
use crate::session::AuthSession;
use crate::store::TokenKind;
use crate::timer::TimerHandle;

/// Holder for the currently armed refresh timer.
#[derive(Default)]
pub(crate) struct ScheduleSlot {
    handle: Mutex<Option<TimerHandle>>,
}

impl ScheduleSlot {
    pub(crate) fn is_armed(&self) -> bool {
        self.handle.lock().as_ref().is_some_and(|h| !h.is_cancelled())
    }
}

/// Delay until the next proactive refresh: `max(min_delay, expiry - now - lead)`.
///
/// `None` means the token is already inside its renewal window and the
/// refresh should run now. With a non-zero `min_delay` this never happens.
pub fn compute_delay(expiry_ms: u64, now_ms: u64, policy: &RefreshPolicy) -> Option<Duration> {
    let until_refresh = expiry_ms as i128 - now_ms as i128 - policy.lead.as_millis() as i128;
    let delay = until_refresh.max(policy.min_delay.as_millis() as i128);
    if delay <= 0 {
        None
    } else {
        Some(Duration::from_millis(delay as u64))
    }
}

impl AuthSession {
    /// Re-arm the proactive refresh timer from the stored access token.
    ///
    /// Without a token or a readable expiry no timer is armed. Must be called
    /// within a Tokio runtime.
    pub fn reschedule(self: &Arc<Self>) {
        let mut slot = self.schedule.handle.lock();
        if let Some(previous) = slot.take() {
            previous.cancel();
        }

        let Some(token) = self.store.get(TokenKind::Access) else {
            debug!("no access token, refresh not scheduled");
            return;
        };
        let Some(expiry_ms) = expiry_of(&token) else {
            debug!("access token expiry unknown, refresh not scheduled");
            return;
        };

        let weak = Arc::downgrade(self);
        match compute_delay(expiry_ms, self.clock.now_ms(), &self.policy) {
            None => {
                debug!("access token inside renewal window, refreshing now");
                tokio::spawn(async move {
                    if let Some(session) = weak.upgrade() {
                        session.attempt_refresh().await;
                    }
                });
            }
            Some(delay) => {
                debug!(delay_ms = delay.as_millis() as u64, "scheduling token refresh");
                let task = async move {
                    let Some(session) = weak.upgrade() else {
                        return;
                    };
                    // A successful refresh re-arms on its own.
                    if session.attempt_refresh().await {
                        return;
                    }
                    if session.store.has_session() {
                        session.reschedule();
                    } else {
                        debug!("no refreshable session, refresh schedule stopped");
                    }
                }
                .boxed();
                *slot = Some(self.timer.arm_after(delay, task));
            }
        }
    }

    /// Disarm the proactive refresh timer, if any.
    pub fn cancel_schedule(&self) {
        if let Some(handle) = self.schedule.handle.lock().take() {
            handle.cancel();
            debug!("scheduled refresh cancelled");
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
