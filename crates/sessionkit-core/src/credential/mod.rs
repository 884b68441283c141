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

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A bearer credential together with the bookkeeping needed to renew it.
///
/// The token itself is opaque to everything except the expiry module, which
/// peeks at its embedded expiry claim. A credential is replaced wholesale on
/// every successful renewal, never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// The bearer token attached to outgoing requests
    pub token: String,
    /// When the token was issued, as observed by this client
    pub issued_at: DateTime<Utc>,
    /// The token lifetime in seconds
    pub expires_in: u64,
}

impl Credential {
    pub fn new(token: impl Into<String>, issued_at: DateTime<Utc>, expires_in: u64) -> Self {
        Self {
            token: token.into(),
            issued_at,
            expires_in,
        }
    }

    /// Returns the hard expiry instant, after which the token is no longer
    /// valid for any use.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued_at + TimeDelta::seconds(self.expires_in as i64)
    }

    /// Returns true if the token's lifetime has fully elapsed at `now`.
    pub fn is_hard_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    /// Validates the credential invariants.
    ///
    /// # Panics
    ///
    /// Panics if:
    /// - `token` is empty
    /// - `expires_in` is 0
    #[doc(hidden)]
    #[cfg(test)]
    pub fn validate(&self) {
        assert!(!self.token.is_empty(), "token cannot be empty");
        assert!(self.expires_in > 0, "expires_in must be greater than 0");
    }
}

/// Whether a session currently holds a usable credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
}

/// Result of a successful authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginGrant {
    pub token: String,
    /// Token lifetime in seconds
    pub expires_in: u64,
    /// The authenticated principal (user id or similar backend identifier)
    pub principal: String,
}

/// Result of a successful token renewal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewalGrant {
    pub token: String,
    /// Token lifetime in seconds
    pub expires_in: u64,
}

/// Errors that can occur during session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),
}

impl SessionError {
    /// Returns true if a renewal that failed with this error should be
    /// retried at the next interval.
    pub fn is_retriable(&self) -> bool {
        matches!(self, SessionError::NetworkError(_) | SessionError::ServerError(_))
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        SessionError::ServerError(message.into())
    }

    pub fn network_error(message: impl Into<String>) -> Self {
        SessionError::NetworkError(message.into())
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        SessionError::InvalidData(message.into())
    }

    pub fn persistence_error(message: impl Into<String>) -> Self {
        SessionError::PersistenceError(message.into())
    }
}

/// Authenticates a user against the backend.
///
/// Failures are user-facing: `InvalidCredentials` for a bad identifier/secret
/// pair, `ServerError` for transient backend faults. Neither is retried
/// automatically.
#[async_trait]
pub trait AuthenticationClient: Send + Sync {
    async fn authenticate(&self, identifier: &str, secret: &str) -> Result<LoginGrant, SessionError>;
}

/// Exchanges a still-valid token for a new one with a reset lifetime.
///
/// Fails with `Unauthorized` when the token is no longer eligible for renewal
/// (forces logout) or `NetworkError` for transient faults (eligible for
/// retry).
#[async_trait]
pub trait RenewalClient: Send + Sync {
    async fn renew(&self, current_token: &str) -> Result<RenewalGrant, SessionError>;
}

/// Persists the credential across restarts.
///
/// Implementations store and retrieve the whole credential atomically; a
/// failed save must never leave a token without its matching issue time.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Retrieves the persisted credential, if any.
    async fn load(&self) -> Result<Option<Credential>, SessionError>;

    /// Persists the credential, replacing any previous one.
    async fn save(&self, credential: Credential) -> Result<(), SessionError>;

    /// Removes the persisted credential. Removing an absent credential is not
    /// an error.
    async fn clear(&self) -> Result<(), SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_expires_at_derived_from_issue_time_and_lifetime() {
        let credential = Credential::new("token", instant(1_000), 3600);

        assert_eq!(credential.expires_at(), instant(4_600));
        credential.validate();
    }

    #[test]
    fn test_hard_expiry_boundary() {
        let credential = Credential::new("token", instant(1_000), 3600);

        assert!(!credential.is_hard_expired(instant(4_599)));
        assert!(credential.is_hard_expired(instant(4_600)));
        assert!(credential.is_hard_expired(instant(10_000)));
    }

    #[test]
    fn test_retriable_errors() {
        assert!(SessionError::network_error("timeout").is_retriable());
        assert!(SessionError::server_error("503").is_retriable());
        assert!(!SessionError::InvalidCredentials.is_retriable());
        assert!(!SessionError::Unauthorized("revoked".to_string()).is_retriable());
    }
}
