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

use crate::config::{RefreshPolicy, SessionConfig};
use crate::renewal::{RefreshScheduler, SchedulerState};
use chrono::{DateTime, TimeDelta, Utc};
use log::{info, warn};
use sessionkit_core::credential::{
    AuthenticationClient, Credential, CredentialStore, LoginGrant, SessionError, SessionState,
};
use sessionkit_core::expiry::{is_expired, next_renewal_at};
use sessionkit_core::util::clock::Clock;
use std::sync::{Arc, RwLock};

/// Session state shared between the controller and the renewal timer task.
///
/// The epoch counter advances on every mutation that invalidates in-flight
/// renewals (login, logout, forced logout). Timer tasks carry the epoch they
/// were scheduled against and their commits are rejected once it is stale,
/// so a renewal that was in flight during a logout can never resurrect the
/// session.
pub(crate) struct SessionShared {
    inner: RwLock<SharedInner>,
}

struct SharedInner {
    epoch: u64,
    state: SessionState,
    credential: Option<Credential>,
    last_renewed: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    last_error: Option<String>,
}

impl SessionShared {
    pub(crate) fn new() -> Self {
        Self {
            inner: RwLock::new(SharedInner {
                epoch: 0,
                state: SessionState::Unauthenticated,
                credential: None,
                last_renewed: None,
                consecutive_failures: 0,
                last_error: None,
            }),
        }
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.inner.read().unwrap().epoch
    }

    pub(crate) fn is_current_epoch(&self, epoch: u64) -> bool {
        self.inner.read().unwrap().epoch == epoch
    }

    /// Installs a fresh credential and starts a new epoch (login or
    /// bootstrap).
    pub(crate) fn establish(&self, credential: Credential) {
        let mut inner = self.inner.write().unwrap();
        inner.epoch += 1;
        inner.state = SessionState::Authenticated;
        inner.credential = Some(credential);
        inner.last_renewed = None;
        inner.consecutive_failures = 0;
        inner.last_error = None;
    }

    /// Drops the credential and starts a new epoch (logout or demotion).
    pub(crate) fn clear(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.epoch += 1;
        inner.state = SessionState::Unauthenticated;
        inner.credential = None;
        inner.last_renewed = None;
        inner.consecutive_failures = 0;
        inner.last_error = None;
    }

    /// Returns the current token if `epoch` is still the live session
    /// generation and a credential is present.
    pub(crate) fn token_for_epoch(&self, epoch: u64) -> Option<String> {
        let inner = self.inner.read().unwrap();
        if inner.epoch != epoch {
            return None;
        }
        inner.credential.as_ref().map(|credential| credential.token.clone())
    }

    /// Replaces the credential after a successful renewal. Returns false if
    /// the epoch went stale while the renewal was in flight.
    pub(crate) fn commit_renewal(&self, epoch: u64, credential: Credential, now: DateTime<Utc>) -> bool {
        let mut inner = self.inner.write().unwrap();
        if inner.epoch != epoch {
            return false;
        }
        inner.state = SessionState::Authenticated;
        inner.credential = Some(credential);
        inner.last_renewed = Some(now);
        inner.consecutive_failures = 0;
        inner.last_error = None;
        true
    }

    /// Records a failed renewal attempt. Returns the new consecutive failure
    /// count, or `None` if the epoch went stale.
    pub(crate) fn record_renewal_failure(&self, epoch: u64, error: &SessionError) -> Option<u32> {
        let mut inner = self.inner.write().unwrap();
        if inner.epoch != epoch {
            return None;
        }
        inner.consecutive_failures += 1;
        inner.last_error = Some(error.to_string());
        Some(inner.consecutive_failures)
    }

    /// Demotes the session from within the timer task (renewal rejected as
    /// unauthorized, or the configured failure cap reached). Returns false
    /// if the epoch already went stale.
    pub(crate) fn force_logout(&self, epoch: u64) -> bool {
        let mut inner = self.inner.write().unwrap();
        if inner.epoch != epoch {
            return false;
        }
        inner.epoch += 1;
        inner.state = SessionState::Unauthenticated;
        inner.credential = None;
        inner.last_renewed = None;
        true
    }

    pub(crate) fn state(&self) -> SessionState {
        self.inner.read().unwrap().state
    }

    pub(crate) fn credential(&self) -> Option<Credential> {
        self.inner.read().unwrap().credential.clone()
    }

    pub(crate) fn last_renewed(&self) -> Option<DateTime<Utc>> {
        self.inner.read().unwrap().last_renewed
    }

    pub(crate) fn consecutive_failures(&self) -> u32 {
        self.inner.read().unwrap().consecutive_failures
    }

    pub(crate) fn last_error(&self) -> Option<String> {
        self.inner.read().unwrap().last_error.clone()
    }
}

/// Orchestrates the session token lifecycle.
///
/// The only component the rest of the application interacts with: owns the
/// credential store, the refresh scheduler and the collaborator clients.
/// Constructed explicitly and passed by reference wherever a
/// credential-bearing request is built; there is no module-global session.
pub struct SessionController {
    auth_client: Arc<dyn AuthenticationClient>,
    store: Arc<dyn CredentialStore>,
    policy: RefreshPolicy,
    clock: Arc<dyn Clock>,
    shared: Arc<SessionShared>,
    scheduler: RefreshScheduler,
}

impl SessionController {
    pub fn new(config: SessionConfig) -> Self {
        let shared = Arc::new(SessionShared::new());
        let scheduler = RefreshScheduler::new(
            config.renewal_client,
            config.store.clone(),
            Arc::clone(&shared),
            config.refresh_policy.clone(),
            config.clock.clone(),
            config.on_renewal_error,
        );
        Self {
            auth_client: config.auth_client,
            store: config.store,
            policy: config.refresh_policy,
            clock: config.clock,
            shared,
            scheduler,
        }
    }

    /// Restores the session from the persisted credential, if one survives.
    ///
    /// The store is consulted before any network round-trip. A missing or
    /// hard-expired credential resolves to `Unauthenticated` without a
    /// network call; a live one resumes the session and schedules the next
    /// renewal, immediately if the renewal instant already passed.
    pub async fn bootstrap(&self) -> Result<SessionState, SessionError> {
        let loaded = match self.store.load().await {
            Ok(credential) => credential,
            Err(e) => {
                warn!("Credential store failed during bootstrap, starting unauthenticated: {}", e);
                None
            }
        };

        let now = self.clock.now();
        let credential = match loaded {
            Some(credential) if !is_expired(&credential.token, now) => credential,
            Some(_) => {
                info!("Persisted token is expired, discarding it");
                if let Err(e) = self.store.clear().await {
                    warn!("Failed to clear expired credential: {}", e);
                }
                self.shared.clear();
                return Ok(SessionState::Unauthenticated);
            }
            None => {
                self.shared.clear();
                return Ok(SessionState::Unauthenticated);
            }
        };

        self.shared.establish(credential.clone());

        let target = next_renewal_at(
            credential.issued_at,
            credential.expires_in,
            self.policy.effective_safety_fraction(),
        );
        if target <= now {
            // The renewal instant passed while the process was down or
            // suspended; renew immediately instead of at a negative delay
            self.scheduler.schedule(now + self.immediate_delta());
        } else {
            self.scheduler.schedule(target);
        }

        info!("Session restored from persisted credential");
        Ok(SessionState::Authenticated)
    }

    /// Authenticates and starts the renewal cycle.
    ///
    /// Failures are returned to the caller and never retried here: login is
    /// user-facing and terminal per attempt, unlike background renewal.
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<LoginGrant, SessionError> {
        let grant = self.auth_client.authenticate(identifier, secret).await?;
        if grant.expires_in == 0 {
            return Err(SessionError::invalid_data(
                "Authentication response carries a zero token lifetime".to_string(),
            ));
        }

        let credential = Credential::new(grant.token.clone(), self.clock.now(), grant.expires_in);
        if let Err(e) = self.store.save(credential.clone()).await {
            warn!("Failed to persist credential, session will not survive a restart: {}", e);
        }

        self.shared.establish(credential.clone());
        self.scheduler.schedule(next_renewal_at(
            credential.issued_at,
            credential.expires_in,
            self.policy.effective_safety_fraction(),
        ));

        info!("Session authenticated for principal {}", grant.principal);
        Ok(grant)
    }

    /// Ends the session: cancels the scheduler, then clears the credential.
    pub async fn logout(&self) {
        // Cancel before the credential is cleared; a timer must never fire
        // against a torn-down session
        self.scheduler.cancel();
        self.shared.clear();
        if let Err(e) = self.store.clear().await {
            warn!("Failed to clear credential store during logout: {}", e);
        }
        info!("Session logged out");
    }

    /// Stops the renewal timer without clearing the persisted credential,
    /// so a later `bootstrap()` can resume the session.
    pub fn teardown(&self) {
        self.scheduler.cancel();
    }

    /// Synchronous authenticated check. Observing a hard-expired credential
    /// demotes the session.
    pub fn is_authenticated(&self) -> bool {
        self.read_valid_credential().is_some()
    }

    /// Returns the bearer token to attach to outgoing requests, if the
    /// session holds one that has not passed hard expiry.
    pub fn current_token(&self) -> Option<String> {
        self.read_valid_credential().map(|credential| credential.token)
    }

    fn read_valid_credential(&self) -> Option<Credential> {
        let credential = self.shared.credential()?;
        if is_expired(&credential.token, self.clock.now()) {
            // Hard expiry passed while the scheduler was idle or stuck in
            // retries; demote rather than hand out a token the backend will
            // reject. The persisted copy is discarded at the next bootstrap.
            warn!("Session token passed hard expiry, demoting to unauthenticated");
            self.scheduler.cancel();
            self.shared.clear();
            return None;
        }
        Some(credential)
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Returns the last error encountered during token renewal, if any.
    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error()
    }

    /// Returns the number of consecutive renewal failures.
    pub fn consecutive_failures(&self) -> u32 {
        self.shared.consecutive_failures()
    }

    /// Returns true if recent renewals are succeeding (consecutive failures
    /// below the configured health threshold).
    pub fn is_healthy(&self) -> bool {
        self.shared.consecutive_failures() < self.policy.health_threshold
    }

    /// Returns when the token was last renewed, if ever.
    pub fn last_renewed(&self) -> Option<DateTime<Utc>> {
        self.shared.last_renewed()
    }

    /// Returns the instant the next renewal attempt will fire at, if one is
    /// scheduled.
    pub fn next_renewal_at(&self) -> Option<DateTime<Utc>> {
        self.scheduler.next_renewal_at()
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    fn immediate_delta(&self) -> TimeDelta {
        TimeDelta::from_std(self.policy.immediate_delay).unwrap_or_else(|_| TimeDelta::milliseconds(50))
    }
}
