// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end session lifecycle: scheduled refresh, concurrent dispatch,
//! and sessions restored from disk.

mod backend_support;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;

use backend_support::*;
use rahnum_client::test_support::{http_client, mint_token};
use rahnum_client::timer::{Clock, SystemClock, TokioTimer};
use rahnum_client::{
    ApiClient, ClientConfig, FileStore, KeyValueStore, RefreshPolicy, TokenKind,
};

#[tokio::test]
async fn scheduled_refresh_fires_lead_before_expiry() -> anyhow::Result<()> {
    let backend = start_backend().await?;
    let policy = RefreshPolicy {
        lead: Duration::from_secs(1),
        min_delay: Duration::ZERO,
        proactive_window: Duration::from_secs(1),
    };
    let session = session_for(&backend, Arc::new(TokioTimer), policy);
    let exp_secs = SystemClock.now_ms() / 1000 + 3;
    session.store().set(TokenKind::Access, &mint_token("1", exp_secs));
    session.store().set(TokenKind::Refresh, GOOD_REFRESH);

    let armed_at = Instant::now();
    let expected = Duration::from_millis(exp_secs * 1000 - SystemClock.now_ms() - 1000);
    session.reschedule();
    assert!(session.is_scheduled());

    tokio::time::timeout(Duration::from_secs(5), async {
        while backend.state.refresh_calls() == 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await?;

    let fired = backend.state.refresh_seen_at.lock()[0] - armed_at;
    assert!(fired + Duration::from_millis(100) >= expected, "fired early: {fired:?} < {expected:?}");
    assert!(fired <= expected + Duration::from_millis(500), "fired late: {fired:?} > {expected:?}");

    // The refreshed token is good for an hour, so the next timer is far out.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(backend.state.refresh_calls(), 1);
    assert!(session.is_scheduled());
    assert_eq!(session.access_token(), Some(backend.state.valid_access.lock().clone()));
    Ok(())
}

#[tokio::test]
async fn simultaneous_dispatches_share_one_refresh() -> anyhow::Result<()> {
    let backend = start_backend().await?;
    *backend.state.refresh_delay.lock() = Duration::from_millis(200);
    let (client, _timer) = client_for(&backend);
    seed(&client, &expired(), GOOD_REFRESH);

    let (a, b) = tokio::join!(client.get("/profile/"), client.get("/profile/"));

    assert_eq!(a?["id"], 1);
    assert_eq!(b?["id"], 1);
    assert_eq!(backend.state.refresh_calls(), 1);
    assert_eq!(backend.state.profile_calls(), 2);
    let valid = format!("Bearer {}", backend.state.valid_access.lock());
    assert!(backend.state.auth_headers.lock().iter().all(|h| h.as_deref() == Some(valid.as_str())));
    Ok(())
}

#[tokio::test]
async fn many_tasks_rejected_at_once_share_one_refresh() -> anyhow::Result<()> {
    let backend = start_backend().await?;
    *backend.state.refresh_delay.lock() = Duration::from_millis(300);
    backend.state.issue(3600);
    let (client, _timer) = client_for(&backend);
    seed(&client, &revoked(), GOOD_REFRESH);

    let tasks: Vec<_> = (0..6)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.get("/profile/").await })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await??["id"], 1);
    }

    // Stragglers whose 401 lands after the first refresh completes may start
    // a second one, but never one per task.
    assert!(backend.state.refresh_calls() < 6);
    Ok(())
}

#[tokio::test]
async fn rotated_refresh_token_is_used_next_time() -> anyhow::Result<()> {
    let backend = start_backend().await?;
    *backend.state.rotate.lock() = true;
    let (client, _timer) = client_for(&backend);
    seed(&client, &expired(), GOOD_REFRESH);

    assert!(client.session().attempt_refresh().await);
    assert_eq!(client.session().store().get(TokenKind::Refresh).as_deref(), Some(GOOD_REFRESH));
    assert!(client.session().attempt_refresh().await);
    assert_eq!(backend.state.refresh_calls(), 2);
    Ok(())
}

#[tokio::test]
async fn session_survives_restart_through_file_store() -> anyhow::Result<()> {
    let backend = start_backend().await?;
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("state").join("credentials.json");
    let config = ClientConfig {
        base_url: backend.base_url(),
        credentials_path: Some(path.clone()),
        ..ClientConfig::default()
    };

    {
        let client = ApiClient::new(&config, Arc::new(FileStore::open(config.credentials_path())?))?;
        client.login(&json!({ "username": USERNAME, "password": PASSWORD })).await?;
        client.session().cancel_schedule();
    }

    let store = FileStore::open(&path)?;
    assert!(store.get("authToken1").is_some());
    assert_eq!(store.get("authToken"), store.get("authToken1"));
    assert_eq!(store.get("refreshToken").as_deref(), Some(GOOD_REFRESH));

    let client = ApiClient::new(&config, Arc::new(store))?;
    client.resume();
    assert!(client.session().is_scheduled());
    assert_eq!(client.get("/profile/").await?["username"], USERNAME);
    assert_eq!(client.cached_profile().map(|p| p["role"].clone()), Some(json!("student")));

    client.logout();
    let reopened = FileStore::open(&path)?;
    assert!(reopened.get("authToken1").is_none());
    assert!(reopened.get("refreshToken").is_none());
    assert!(reopened.get("userData").is_none());
    assert_eq!(backend.state.refresh_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn legacy_alias_is_read_after_upgrade() -> anyhow::Result<()> {
    let backend = start_backend().await?;
    let (client, _timer) = client_for(&backend);
    let token = backend.state.issue(3600);
    let legacy = rahnum_client::MemoryStore::new();
    legacy.set("authToken", &token);
    legacy.set("refreshToken", GOOD_REFRESH);
    let session = rahnum_client::AuthSession::new(
        rahnum_client::CredentialStore::new(Arc::new(legacy)),
        http_client(),
        backend.refresh_url(),
    );
    let upgraded = ApiClient::with_session(client.base_url(), http_client(), session);

    assert_eq!(upgraded.get("/profile/").await?["id"], 1);
    assert_eq!(backend.state.last_auth_header(), Some(format!("Bearer {token}")));
    Ok(())
}
