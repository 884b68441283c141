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

use crate::config::DEFAULT_REQUEST_TIMEOUT;
use async_trait::async_trait;
use bon::Builder;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sessionkit_core::credential::{
    AuthenticationClient, LoginGrant, RenewalClient, RenewalGrant, SessionError,
};
use std::time::Duration;

/// Builds an HTTP client with the given request timeout for use with the
/// REST collaborators.
pub fn build_http_client(timeout: Duration) -> Result<Client, SessionError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SessionError::invalid_data(format!("Failed to create HTTP client: {}", e)))
}

fn default_http_client() -> Client {
    build_http_client(DEFAULT_REQUEST_TIMEOUT).unwrap_or_default()
}

/// Authenticates against the backend's login endpoint.
#[derive(Builder)]
pub struct RestAuthenticationClient {
    #[builder(default = default_http_client())]
    http_client: Client,
    #[builder(into)]
    login_url: String,
}

/// Login request
#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    identifier: &'a str,
    secret: &'a str,
}

/// Login response
#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
    expires_in: u64,
    principal: String,
}

#[async_trait]
impl AuthenticationClient for RestAuthenticationClient {
    async fn authenticate(&self, identifier: &str, secret: &str) -> Result<LoginGrant, SessionError> {
        let request = LoginRequest { identifier, secret };

        let response = self
            .http_client
            .post(&self.login_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| SessionError::server_error(format!("Failed to send login request: {}", e)))?;

        if !response.status().is_success() {
            let (status, body) = response_detail(response).await;
            return Err(match status.as_u16() {
                400 | 401 | 403 => SessionError::InvalidCredentials,
                _ => SessionError::server_error(format!("Login failed with status {}: {}", status, body)),
            });
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| SessionError::invalid_data(format!("Failed to parse login response: {}", e)))?;

        if login.expires_in == 0 {
            return Err(SessionError::invalid_data(
                "Login response carries a zero token lifetime".to_string(),
            ));
        }

        Ok(LoginGrant {
            token: login.token,
            expires_in: login.expires_in,
            principal: login.principal,
        })
    }
}

/// Renews a bearer token against the backend's refresh endpoint.
///
/// The current token rides in the Authorization header; the backend answers
/// with a replacement token and a reset lifetime.
#[derive(Builder)]
pub struct RestRenewalClient {
    #[builder(default = default_http_client())]
    http_client: Client,
    #[builder(into)]
    renew_url: String,
}

/// Renewal response
#[derive(Debug, Deserialize)]
struct RenewalResponse {
    token: String,
    expires_in: u64,
}

#[async_trait]
impl RenewalClient for RestRenewalClient {
    async fn renew(&self, current_token: &str) -> Result<RenewalGrant, SessionError> {
        let response = self
            .http_client
            .post(&self.renew_url)
            .header("Authorization", format!("Bearer {}", current_token))
            .send()
            .await
            .map_err(|e| SessionError::network_error(format!("Failed to send renewal request: {}", e)))?;

        if !response.status().is_success() {
            let (status, body) = response_detail(response).await;
            let message = format!("Renewal failed with status {}: {}", status, body);
            return Err(match status.as_u16() {
                401 | 403 => SessionError::Unauthorized(message),
                _ => SessionError::NetworkError(message),
            });
        }

        let renewal: RenewalResponse = response
            .json()
            .await
            .map_err(|e| SessionError::network_error(format!("Failed to parse renewal response: {}", e)))?;

        if renewal.expires_in == 0 {
            return Err(SessionError::network_error(
                "Renewal response carries a zero token lifetime".to_string(),
            ));
        }

        Ok(RenewalGrant {
            token: renewal.token,
            expires_in: renewal.expires_in,
        })
    }
}

/// Helper to extract status and body from an HTTP error response.
async fn response_detail(response: reqwest::Response) -> (reqwest::StatusCode, String) {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    (status, body)
}
