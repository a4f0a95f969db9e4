// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wall clock and one-shot timers, injectable so scheduling can be driven
//! deterministically in tests.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

/// Source of "now" in epoch milliseconds (token expiry is wall-clock time).
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
    }
}

/// Arms one-shot tasks.
pub trait Timer: Send + Sync {
    /// Run `task` once after `delay` unless the returned handle is cancelled
    /// first. Cancelling after the task started has no effect on it.
    fn arm_after(&self, delay: Duration, task: BoxFuture<'static, ()>) -> TimerHandle;
}

/// Cancel handle for an armed task.
#[derive(Debug, Clone, Default)]
pub struct TimerHandle {
    cancel: CancellationToken,
}

impl TimerHandle {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Timer backed by `tokio::time::sleep` on the current runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTimer;

impl Timer for TokioTimer {
    fn arm_after(&self, delay: Duration, task: BoxFuture<'static, ()>) -> TimerHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => task.await,
                _ = token.cancelled() => {}
            }
        });
        TimerHandle::new(cancel)
    }
}

#[cfg(test)]
#[path = "timer_tests.rs"]
mod tests;
