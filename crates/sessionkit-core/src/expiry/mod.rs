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

#[cfg(test)]
mod tests;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur while decoding a token's expiry claim.
///
/// Callers deciding validity treat any decode failure as "expired": a token
/// we cannot read is a token we cannot trust.
#[derive(Debug, Error)]
pub enum CredentialDecodeError {
    #[error("Token is not a three-part JWT")]
    MalformedToken,

    #[error("Invalid payload encoding: {0}")]
    InvalidEncoding(String),

    #[error("Missing or invalid exp claim")]
    MissingExpiry,
}

#[derive(Deserialize)]
struct ExpiryClaims {
    exp: i64,
}

/// Extracts the hard expiry instant from a token's embedded `exp` claim.
///
/// The signature is not verified; the backend is the verifier. This is a
/// client-side peek used only to decide whether the token is worth
/// presenting or renewing.
pub fn decode_expiry(token: &str) -> Result<DateTime<Utc>, CredentialDecodeError> {
    let mut parts = token.split('.');
    let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return Err(CredentialDecodeError::MalformedToken),
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| CredentialDecodeError::InvalidEncoding(e.to_string()))?;

    let claims: ExpiryClaims =
        serde_json::from_slice(&bytes).map_err(|_| CredentialDecodeError::MissingExpiry)?;

    DateTime::from_timestamp(claims.exp, 0).ok_or(CredentialDecodeError::MissingExpiry)
}

/// Returns true if the token's embedded expiry is at or before `now`, or if
/// the token cannot be decoded at all. Invalid input fails closed.
pub fn is_expired(token: &str, now: DateTime<Utc>) -> bool {
    match decode_expiry(token) {
        Ok(expires_at) => expires_at <= now,
        Err(_) => true,
    }
}

/// Computes the instant at which proactive renewal should be attempted:
/// `issued_at + expires_in * safety_fraction`.
///
/// With the default fraction of 5/6, one sixth of the lifetime remains as a
/// buffer before hard expiry. Callers must treat a result in the past as
/// "renew immediately", never as a negative delay.
pub fn next_renewal_at(issued_at: DateTime<Utc>, expires_in: u64, safety_fraction: f64) -> DateTime<Utc> {
    let offset_millis = (expires_in as f64 * safety_fraction * 1000.0) as i64;
    issued_at + TimeDelta::milliseconds(offset_millis)
}
