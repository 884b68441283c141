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
use sessionkit_core::credential::{Credential, CredentialStore, SessionError};
use sessionkit_core::util::clock::{default_clock, Clock};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory credential store with auto-expiry.
///
/// The stored credential evaporates once its hard expiry passes, so a load
/// can never hand out a token the backend would reject on lifetime grounds.
/// State is lost on restart; pair with a durable tier via
/// [`LayeredCredentialStore`](crate::store::LayeredCredentialStore) when the
/// session must survive one.
pub struct MemoryCredentialStore {
    slot: RwLock<Option<Credential>>,
    clock: Arc<dyn Clock>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(None),
            clock: default_clock(),
        }
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            slot: RwLock::new(None),
            clock,
        }
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<Credential>, SessionError> {
        let now = self.clock.now();
        let mut slot = self.slot.write().await;

        if matches!(&*slot, Some(credential) if credential.is_hard_expired(now)) {
            *slot = None;
            return Ok(None);
        }
        Ok(slot.clone())
    }

    async fn save(&self, credential: Credential) -> Result<(), SessionError> {
        *self.slot.write().await = Some(credential);
        Ok(())
    }

    async fn clear(&self) -> Result<(), SessionError> {
        *self.slot.write().await = None;
        Ok(())
    }
}
