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

use bon::Builder;
use log::warn;
use sessionkit_core::credential::{AuthenticationClient, CredentialStore, RenewalClient, SessionError};
use sessionkit_core::util::clock::{default_clock, Clock};
use std::sync::Arc;
use std::time::Duration;

// Default values for configurable parameters
pub(crate) const DEFAULT_SAFETY_FRACTION: f64 = 5.0 / 6.0;
pub(crate) const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
pub(crate) const DEFAULT_IMMEDIATE_DELAY: Duration = Duration::from_millis(50);
pub(crate) const DEFAULT_HEALTH_THRESHOLD: u32 = 3;
pub(crate) const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Type alias for the renewal error callback function
pub type ErrorCallback = Arc<dyn Fn(&SessionError) + Send + Sync>;

/// Scheduling policy for proactive token renewal.
///
/// Supplied at construction time; there is no environment-flag branching in
/// the scheduling path. Diagnostic or test deployments tune these values
/// through the builder instead.
#[derive(Builder, Clone)]
pub struct RefreshPolicy {
    /// Proportion of the token lifetime after which renewal is attempted
    /// (0.0-1.0, defaults to 5/6)
    #[builder(default = DEFAULT_SAFETY_FRACTION)]
    pub safety_fraction: f64,
    /// Fixed delay between renewal retries after a transient failure
    /// (defaults to 1 second, no backoff growth)
    #[builder(default = DEFAULT_RETRY_DELAY)]
    pub retry_delay: Duration,
    /// Short delay used when a renewal instant is already in the past and
    /// renewal must happen "immediately" (defaults to 50ms)
    #[builder(default = DEFAULT_IMMEDIATE_DELAY)]
    pub immediate_delay: Duration,
    /// Consecutive renewal failures after which the scheduler stops and the
    /// session is demoted to unauthenticated. `None` (the default) preserves
    /// the inherited behavior: retry indefinitely at `retry_delay`.
    pub max_consecutive_failures: Option<u32>,
    /// Number of consecutive failures before the session is considered
    /// unhealthy (defaults to 3)
    #[builder(default = DEFAULT_HEALTH_THRESHOLD)]
    pub health_threshold: u32,
}

impl RefreshPolicy {
    /// Returns the configured safety fraction, falling back to the default
    /// when the configured value is outside (0, 1].
    pub fn effective_safety_fraction(&self) -> f64 {
        if self.safety_fraction.is_finite() && self.safety_fraction > 0.0 && self.safety_fraction <= 1.0 {
            self.safety_fraction
        } else {
            warn!(
                "Safety fraction {} is outside (0, 1], falling back to default",
                self.safety_fraction
            );
            DEFAULT_SAFETY_FRACTION
        }
    }
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl std::fmt::Debug for RefreshPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshPolicy")
            .field("safety_fraction", &self.safety_fraction)
            .field("retry_delay", &self.retry_delay)
            .field("immediate_delay", &self.immediate_delay)
            .field("max_consecutive_failures", &self.max_consecutive_failures)
            .field("health_threshold", &self.health_threshold)
            .finish()
    }
}

/// Configuration for the session controller: collaborator wiring plus the
/// refresh policy.
#[derive(Builder)]
pub struct SessionConfig {
    /// Authenticates the user at login
    pub auth_client: Arc<dyn AuthenticationClient>,
    /// Exchanges a still-valid token for a fresh one
    pub renewal_client: Arc<dyn RenewalClient>,
    /// Persists the credential across restarts
    pub store: Arc<dyn CredentialStore>,
    #[builder(default)]
    pub refresh_policy: RefreshPolicy,
    /// Optional callback invoked whenever a background renewal attempt fails
    pub on_renewal_error: Option<ErrorCallback>,
    #[builder(default = default_clock())]
    pub(crate) clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("refresh_policy", &self.refresh_policy)
            .field(
                "on_renewal_error",
                &self.on_renewal_error.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}
