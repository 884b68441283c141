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

use crate::config::{ErrorCallback, RefreshPolicy};
use crate::session::SessionShared;
use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, error, warn};
use sessionkit_core::credential::{Credential, CredentialStore, RenewalClient, SessionError};
use sessionkit_core::expiry::next_renewal_at;
use sessionkit_core::util::clock::Clock;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Observable scheduler state.
///
/// `Scheduled` and `RetryScheduled` carry the instant the pending timer will
/// fire at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Scheduled(DateTime<Utc>),
    Firing,
    RetryScheduled(DateTime<Utc>),
}

/// Handle for the single pending renewal timer.
///
/// Dropping this handle signals the timer task to stop and aborts it.
struct TimerHandle {
    shutdown_tx: watch::Sender<bool>,
    task_handle: JoinHandle<()>,
}

impl TimerHandle {
    fn new(shutdown_tx: watch::Sender<bool>, task_handle: JoinHandle<()>) -> Self {
        Self {
            shutdown_tx,
            task_handle,
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        // Signal the timer task to stop
        let _ = self.shutdown_tx.send(true);
        // Abort the task as backup
        self.task_handle.abort();
    }
}

/// Owns the single pending renewal timer for a session.
///
/// `schedule()` always cancels any existing timer before installing the next
/// one, so at most one renewal attempt can ever be in flight for a session.
/// Started by the session controller at bootstrap or login and stopped by
/// `cancel()` on logout or teardown.
pub struct RefreshScheduler {
    driver: Arc<RenewalDriver>,
    status: Arc<RwLock<SchedulerState>>,
    pending: Mutex<Option<TimerHandle>>,
}

impl RefreshScheduler {
    pub(crate) fn new(
        renewal_client: Arc<dyn RenewalClient>,
        store: Arc<dyn CredentialStore>,
        shared: Arc<SessionShared>,
        policy: RefreshPolicy,
        clock: Arc<dyn Clock>,
        on_renewal_error: Option<ErrorCallback>,
    ) -> Self {
        let status = Arc::new(RwLock::new(SchedulerState::Idle));
        let driver = Arc::new(RenewalDriver {
            renewal_client,
            store,
            shared,
            policy,
            clock,
            on_renewal_error,
            status: Arc::clone(&status),
        });
        Self {
            driver,
            status,
            pending: Mutex::new(None),
        }
    }

    /// Cancels any existing timer, then arranges exactly one renewal attempt
    /// at `target`.
    pub fn schedule(&self, target: DateTime<Utc>) {
        let mut pending = self.pending.lock().unwrap();
        // Cancel-then-set: the previous timer is torn down before the next
        // one is installed
        pending.take();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let epoch = self.driver.shared.epoch();
        *self.status.write().unwrap() = SchedulerState::Scheduled(target);

        debug!("Renewal scheduled for {}", target);
        let task_handle = tokio::spawn(Arc::clone(&self.driver).run(shutdown_rx, target, epoch));
        *pending = Some(TimerHandle::new(shutdown_tx, task_handle));
    }

    /// Clears any pending timer and returns to `Idle`.
    ///
    /// After this returns, no previously scheduled renewal will fire.
    pub fn cancel(&self) {
        self.pending.lock().unwrap().take();
        *self.status.write().unwrap() = SchedulerState::Idle;
    }

    pub fn state(&self) -> SchedulerState {
        *self.status.read().unwrap()
    }

    /// Returns the instant the pending timer will fire at, if one is pending.
    pub fn next_renewal_at(&self) -> Option<DateTime<Utc>> {
        match self.state() {
            SchedulerState::Scheduled(target) | SchedulerState::RetryScheduled(target) => Some(target),
            SchedulerState::Idle | SchedulerState::Firing => None,
        }
    }
}

/// The state the timer task carries: renewal collaborator, store, shared
/// session state and policy.
struct RenewalDriver {
    renewal_client: Arc<dyn RenewalClient>,
    store: Arc<dyn CredentialStore>,
    shared: Arc<SessionShared>,
    policy: RefreshPolicy,
    clock: Arc<dyn Clock>,
    on_renewal_error: Option<ErrorCallback>,
    status: Arc<RwLock<SchedulerState>>,
}

impl RenewalDriver {
    /// Timer task body: sleep until the target instant, fire a renewal
    /// attempt, then reschedule (on success) or retry (on failure) until
    /// cancelled.
    ///
    /// `epoch` identifies the session generation this timer was scheduled
    /// against; state commits are fenced on it so a renewal can never
    /// resurrect a session that logged out while the attempt was in flight.
    async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>, initial_target: DateTime<Utc>, epoch: u64) {
        let mut target = initial_target;
        loop {
            let delay = self.delay_until(target);

            // Wait for either the timer or the shutdown signal
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        return;
                    }
                    continue;
                }
            }

            match self.fire(epoch).await {
                Some(next_target) => target = next_target,
                None => return,
            }
        }
    }

    /// Runs one renewal attempt. Returns the next fire instant, or `None`
    /// when the timer must stop (cancelled session, forced logout, or a
    /// configured failure cap reached).
    async fn fire(&self, epoch: u64) -> Option<DateTime<Utc>> {
        let current_token = self.shared.token_for_epoch(epoch)?;
        *self.status.write().unwrap() = SchedulerState::Firing;

        let result = self.renewal_client.renew(&current_token).await.and_then(|grant| {
            if grant.expires_in == 0 {
                Err(SessionError::invalid_data(
                    "Renewal response carries a zero token lifetime".to_string(),
                ))
            } else {
                Ok(grant)
            }
        });

        match result {
            Ok(grant) => {
                let now = self.clock.now();
                let credential = Credential::new(grant.token, now, grant.expires_in);

                if !self.shared.is_current_epoch(epoch) {
                    return None;
                }

                // Persistence is best-effort: a failed write costs restart
                // survival, not the live session
                if let Err(e) = self.store.save(credential.clone()).await {
                    error!("Failed to persist renewed credential: {}", e);
                }

                if !self.shared.commit_renewal(epoch, credential.clone(), now) {
                    // A logout raced the renewal; remove what was just persisted
                    if let Err(e) = self.store.clear().await {
                        warn!("Failed to clear credential store after cancelled renewal: {}", e);
                    }
                    return None;
                }

                let next = next_renewal_at(
                    credential.issued_at,
                    credential.expires_in,
                    self.policy.effective_safety_fraction(),
                );
                debug!("Token renewed, next renewal at {}", next);
                *self.status.write().unwrap() = SchedulerState::Scheduled(next);
                Some(next)
            }
            Err(SessionError::Unauthorized(message)) => {
                let err = SessionError::Unauthorized(message);
                error!("Token is no longer renewable, forcing logout: {}", err);
                if let Some(callback) = &self.on_renewal_error {
                    callback(&err);
                }
                if self.shared.force_logout(epoch) {
                    if let Err(e) = self.store.clear().await {
                        warn!("Failed to clear credential store during forced logout: {}", e);
                    }
                }
                *self.status.write().unwrap() = SchedulerState::Idle;
                None
            }
            Err(err) => {
                let failures = self.shared.record_renewal_failure(epoch, &err)?;
                error!("Error renewing token: {}. Will retry at next interval", err);
                if let Some(callback) = &self.on_renewal_error {
                    callback(&err);
                }

                if let Some(cap) = self.policy.max_consecutive_failures {
                    if failures >= cap {
                        error!(
                            "Token renewal failed {} times consecutively. Stopping renewal and demoting session.",
                            cap
                        );
                        if self.shared.force_logout(epoch) {
                            if let Err(e) = self.store.clear().await {
                                warn!("Failed to clear credential store after failure cap: {}", e);
                            }
                        }
                        *self.status.write().unwrap() = SchedulerState::Idle;
                        return None;
                    }
                }

                let retry_delay =
                    TimeDelta::from_std(self.policy.retry_delay).unwrap_or_else(|_| TimeDelta::seconds(1));
                let next = self.clock.now() + retry_delay;
                *self.status.write().unwrap() = SchedulerState::RetryScheduled(next);
                Some(next)
            }
        }
    }

    /// Converts a target instant into a sleep duration. A target at or
    /// before now means "renew immediately": the configured short delay,
    /// never a negative one.
    fn delay_until(&self, target: DateTime<Utc>) -> Duration {
        match (target - self.clock.now()).to_std() {
            Ok(delay) if delay > Duration::ZERO => delay,
            _ => self.policy.immediate_delay,
        }
    }
}
