//  Copyright (c) 2026 Metaform Systems, Inc
//
//  This program and the accompanying materials are made available under the
//  terms of the Apache License, Version 2.0 which is available at
//  https://www.apache.org/licenses/LICENSE-2.0
//
//  SPDX-License-Identifier: Apache-2.0
//
//  Contributors:
//       Metaform Systems, Inc. - initial API and implementation
//

//! End-to-end session lifecycle tests over a mocked REST backend and the
//! two-tier credential store.

use chrono::{TimeDelta, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use sessionkit_client::rest::{RestAuthenticationClient, RestRenewalClient};
use sessionkit_client::store::{FileCredentialStore, LayeredCredentialStore, MemoryCredentialStore};
use sessionkit_client::{RefreshPolicy, SessionConfig, SessionController};
use sessionkit_core::credential::SessionState;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Serialize)]
struct TestClaims {
    sub: String,
    exp: i64,
}

fn token_with_lifetime(seconds: i64) -> String {
    let claims = TestClaims {
        sub: "user-1".to_string(),
        exp: (Utc::now() + TimeDelta::seconds(seconds)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"test-secret"),
    )
    .expect("Failed to mint test token")
}

async fn mount_login(server: &MockServer, token: &str, expires_in: u64) {
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "token": token,
            "expires_in": expires_in,
            "principal": "admin"
        })))
        .mount(server)
        .await;
}

fn build_controller(server: &MockServer, credential_path: &Path, policy: RefreshPolicy) -> SessionController {
    let auth_client = RestAuthenticationClient::builder()
        .login_url(format!("{}/auth/login", server.uri()))
        .build();
    let renewal_client = RestRenewalClient::builder()
        .renew_url(format!("{}/auth/renew", server.uri()))
        .build();
    let store = LayeredCredentialStore::new(
        Arc::new(MemoryCredentialStore::new()),
        Arc::new(FileCredentialStore::new(credential_path)),
    );

    SessionController::new(
        SessionConfig::builder()
            .auth_client(Arc::new(auth_client))
            .renewal_client(Arc::new(renewal_client))
            .store(Arc::new(store))
            .refresh_policy(policy)
            .build(),
    )
}

/// Polls until `condition` holds or the timeout elapses.
async fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    condition()
}

#[tokio::test]
async fn test_login_survives_reload_and_logout_clears_everything() {
    let server = MockServer::start().await;
    let token = token_with_lifetime(3600);
    mount_login(&server, &token, 3600).await;

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let credential_path = dir.path().join("credential.json");

    // Login persists the credential to the durable tier
    let first = build_controller(&server, &credential_path, RefreshPolicy::default());
    first.login("admin", "hunter2").await.expect("Login should succeed");

    assert!(first.is_authenticated());
    assert_eq!(first.current_token(), Some(token.clone()));
    assert!(credential_path.exists());

    first.teardown();

    // Simulated reload: a fresh controller over the same durable tier
    let second = build_controller(&server, &credential_path, RefreshPolicy::default());
    let state = second.bootstrap().await.expect("Bootstrap should succeed");

    assert_eq!(state, SessionState::Authenticated);
    assert_eq!(second.current_token(), Some(token));

    // Logout clears both the session and the persisted credential
    second.logout().await;
    assert!(!second.is_authenticated());
    assert!(!credential_path.exists());

    let third = build_controller(&server, &credential_path, RefreshPolicy::default());
    let state = third.bootstrap().await.expect("Bootstrap should succeed");
    assert_eq!(state, SessionState::Unauthenticated);
}

#[tokio::test]
async fn test_background_renewal_replaces_token() {
    let server = MockServer::start().await;
    let original_token = token_with_lifetime(6);
    let renewed_token = token_with_lifetime(3600);
    mount_login(&server, &original_token, 6).await;

    Mock::given(method("POST"))
        .and(path("/auth/renew"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "token": renewed_token,
            "expires_in": 3600
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let credential_path = dir.path().join("credential.json");

    // A six-second lifetime with a 1/6 fraction schedules renewal one second in
    let policy = RefreshPolicy::builder().safety_fraction(1.0 / 6.0).build();
    let controller = build_controller(&server, &credential_path, policy);

    controller.login("admin", "hunter2").await.expect("Login should succeed");
    assert_eq!(controller.current_token(), Some(original_token));

    let renewed = wait_for(Duration::from_secs(5), || {
        controller.current_token() == Some(renewed_token.clone())
    })
    .await;

    assert!(renewed, "The token should be replaced by the background renewal");
    assert!(controller.is_authenticated());
    assert!(controller.last_renewed().is_some());
    assert_eq!(controller.consecutive_failures(), 0);

    controller.teardown();
}

#[tokio::test]
async fn test_failing_renewal_retries_and_keeps_session_alive() {
    let server = MockServer::start().await;
    let token = token_with_lifetime(30);
    mount_login(&server, &token, 30).await;

    Mock::given(method("POST"))
        .and(path("/auth/renew"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let credential_path = dir.path().join("credential.json");

    // Renew one second in, retry every 200ms
    let policy = RefreshPolicy::builder()
        .safety_fraction(1.0 / 30.0)
        .retry_delay(Duration::from_millis(200))
        .build();
    let controller = build_controller(&server, &credential_path, policy);

    controller.login("admin", "hunter2").await.expect("Login should succeed");

    let retried = wait_for(Duration::from_secs(5), || controller.consecutive_failures() >= 3).await;

    assert!(retried, "Renewal should keep retrying at the fixed interval");
    // Failing renewals are invisible: the session stays authenticated on the
    // original token until hard expiry
    assert!(controller.is_authenticated());
    assert_eq!(controller.current_token(), Some(token));
    assert!(controller.last_error().is_some());
    assert!(!controller.is_healthy());

    controller.teardown();
}
