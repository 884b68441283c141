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
use log::warn;
use sessionkit_core::credential::{Credential, CredentialStore, SessionError};
use std::path::PathBuf;
use tokio::fs;

/// Durable credential store backed by a JSON file.
///
/// The file holds the whole credential triple and is replaced atomically
/// (write to a sibling temp file, then rename), so a crash mid-write can
/// never leave a token without its matching issue time. Consulted at
/// bootstrap before any network round-trip.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn staging_path(&self) -> PathBuf {
        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        PathBuf::from(staging)
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<Credential>, SessionError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SessionError::persistence_error(format!(
                    "Failed to read credential file {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        match serde_json::from_str::<Credential>(&contents) {
            Ok(credential) if credential.expires_in > 0 => Ok(Some(credential)),
            Ok(_) => {
                warn!("Credential file {} has a zero lifetime, ignoring it", self.path.display());
                Ok(None)
            }
            Err(e) => {
                // A corrupt file degrades to unauthenticated rather than failing bootstrap
                warn!(
                    "Credential file {} is not readable ({}), ignoring it",
                    self.path.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    async fn save(&self, credential: Credential) -> Result<(), SessionError> {
        let contents = serde_json::to_vec(&credential)
            .map_err(|e| SessionError::persistence_error(format!("Failed to serialize credential: {}", e)))?;

        let staging = self.staging_path();
        fs::write(&staging, &contents).await.map_err(|e| {
            SessionError::persistence_error(format!(
                "Failed to write credential file {}: {}",
                staging.display(),
                e
            ))
        })?;

        fs::rename(&staging, &self.path).await.map_err(|e| {
            SessionError::persistence_error(format!(
                "Failed to replace credential file {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    async fn clear(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::persistence_error(format!(
                "Failed to remove credential file {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}
