// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic clock, timer, and token helpers for tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::timer::{Clock, Timer, TimerHandle};

/// Plain HTTP client with the crypto provider installed.
pub fn http_client() -> reqwest::Client {
    crate::ensure_crypto();
    reqwest::Client::builder().build().unwrap_or_default()
}

/// Build an unsigned JWT-shaped token with `sub` and `exp` (epoch seconds).
pub fn mint_token(sub: &str, exp_secs: u64) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = serde_json::json!({ "sub": sub, "exp": exp_secs });
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn at(now_ms: u64) -> Arc<Self> {
        Arc::new(Self { now_ms: AtomicU64::new(now_ms) })
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

struct ArmedTask {
    delay: Duration,
    handle: TimerHandle,
    task: Option<BoxFuture<'static, ()>>,
}

/// A timer that records armed tasks and runs them only on [`fire_pending`].
///
/// [`fire_pending`]: RecordingTimer::fire_pending
#[derive(Default)]
pub struct RecordingTimer {
    armed: Mutex<Vec<ArmedTask>>,
}

impl RecordingTimer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Delay of every task ever armed, in arm order.
    pub fn delays(&self) -> Vec<Duration> {
        self.armed.lock().iter().map(|a| a.delay).collect()
    }

    /// Delays of tasks that are neither cancelled nor fired.
    pub fn pending(&self) -> Vec<Duration> {
        self.armed
            .lock()
            .iter()
            .filter(|a| a.task.is_some() && !a.handle.is_cancelled())
            .map(|a| a.delay)
            .collect()
    }

    /// Run the most recently armed pending task. Returns `false` if none.
    pub async fn fire_pending(&self) -> bool {
        let task = {
            let mut armed = self.armed.lock();
            armed
                .iter_mut()
                .rev()
                .find(|a| a.task.is_some() && !a.handle.is_cancelled())
                .and_then(|a| a.task.take())
        };
        match task {
            Some(task) => {
                task.await;
                true
            }
            None => false,
        }
    }
}

impl Timer for RecordingTimer {
    fn arm_after(&self, delay: Duration, task: BoxFuture<'static, ()>) -> TimerHandle {
        let handle = TimerHandle::new(CancellationToken::new());
        self.armed.lock().push(ArmedTask { delay, handle: handle.clone(), task: Some(task) });
        handle
    }
}
