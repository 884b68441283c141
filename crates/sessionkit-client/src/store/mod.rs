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

pub mod file;
pub mod mem;

pub use file::FileCredentialStore;
pub use mem::MemoryCredentialStore;

use async_trait::async_trait;
use log::warn;
use sessionkit_core::credential::{Credential, CredentialStore, SessionError};
use std::sync::Arc;

/// Two-tier credential store: a fast auto-expiring tier over a durable tier.
///
/// Writes go through to both tiers, durable first. Reads prefer the fast
/// tier and fall back to the durable one, warming the fast tier on a hit so
/// subsequent reads stay cheap.
pub struct LayeredCredentialStore {
    primary: Arc<dyn CredentialStore>,
    durable: Arc<dyn CredentialStore>,
}

impl LayeredCredentialStore {
    pub fn new(primary: Arc<dyn CredentialStore>, durable: Arc<dyn CredentialStore>) -> Self {
        Self { primary, durable }
    }
}

#[async_trait]
impl CredentialStore for LayeredCredentialStore {
    async fn load(&self) -> Result<Option<Credential>, SessionError> {
        match self.primary.load().await {
            Ok(Some(credential)) => return Ok(Some(credential)),
            Ok(None) => {}
            Err(e) => warn!("Primary credential tier failed to load: {}", e),
        }

        let credential = self.durable.load().await?;
        if let Some(credential) = &credential {
            if let Err(e) = self.primary.save(credential.clone()).await {
                warn!("Failed to warm primary credential tier: {}", e);
            }
        }
        Ok(credential)
    }

    async fn save(&self, credential: Credential) -> Result<(), SessionError> {
        self.durable.save(credential.clone()).await?;
        if let Err(e) = self.primary.save(credential).await {
            warn!("Failed to write primary credential tier: {}", e);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), SessionError> {
        let durable_result = self.durable.clear().await;
        if let Err(e) = self.primary.clear().await {
            warn!("Failed to clear primary credential tier: {}", e);
        }
        durable_result
    }
}
