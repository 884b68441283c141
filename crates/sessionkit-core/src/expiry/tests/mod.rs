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

use super::*;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeDelta, Utc};

/// Builds an unsigned JWT-shaped token with the given `exp` claim.
fn token_with_exp(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"user-1","exp":{}}}"#, exp));
    format!("{}.{}.signature", header, payload)
}

fn instant(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

#[test]
fn test_decode_expiry_reads_exp_claim() {
    let token = token_with_exp(1_700_003_600);

    let expires_at = decode_expiry(&token).expect("exp claim should decode");

    assert_eq!(expires_at, instant(1_700_003_600));
}

#[test]
fn test_decode_expiry_rejects_non_jwt_input() {
    assert!(matches!(
        decode_expiry("not-a-jwt"),
        Err(CredentialDecodeError::MalformedToken)
    ));
    assert!(matches!(
        decode_expiry("one.two"),
        Err(CredentialDecodeError::MalformedToken)
    ));
    assert!(matches!(
        decode_expiry("a.b.c.d"),
        Err(CredentialDecodeError::MalformedToken)
    ));
}

#[test]
fn test_decode_expiry_rejects_bad_payload_encoding() {
    assert!(matches!(
        decode_expiry("header.!!!not-base64!!!.sig"),
        Err(CredentialDecodeError::InvalidEncoding(_))
    ));
}

#[test]
fn test_decode_expiry_rejects_missing_exp() {
    let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"user-1"}"#);
    let token = format!("header.{}.sig", payload);

    assert!(matches!(
        decode_expiry(&token),
        Err(CredentialDecodeError::MissingExpiry)
    ));
}

#[test]
fn test_is_expired_for_past_expiry() {
    let now = instant(1_700_000_000);
    let token = token_with_exp(1_699_999_999);

    assert!(is_expired(&token, now));
}

#[test]
fn test_is_expired_false_for_future_expiry() {
    let now = instant(1_700_000_000);
    let token = token_with_exp(1_700_003_600);

    assert!(!is_expired(&token, now));
}

#[test]
fn test_is_expired_at_exact_expiry_instant() {
    let now = instant(1_700_000_000);
    let token = token_with_exp(1_700_000_000);

    assert!(is_expired(&token, now));
}

#[test]
fn test_undecodable_tokens_fail_closed() {
    let now = instant(1_700_000_000);

    assert!(is_expired("", now));
    assert!(is_expired("garbage", now));
    assert!(is_expired("a.%%%.c", now));
}

#[test]
fn test_next_renewal_with_default_fraction() {
    // Login at t=0 with a one-hour lifetime and 5/6 fraction renews at t=3000
    let issued_at = instant(0);

    let renewal_at = next_renewal_at(issued_at, 3600, 5.0 / 6.0);

    assert_eq!(renewal_at, instant(3_000));
}

#[test]
fn test_next_renewal_never_exceeds_hard_expiry() {
    let issued_at = instant(1_700_000_000);
    let expires_in = 3600u64;
    let hard_expiry = issued_at + TimeDelta::seconds(expires_in as i64);

    for fraction in [0.01, 0.1, 0.5, 5.0 / 6.0, 0.99, 1.0] {
        let renewal_at = next_renewal_at(issued_at, expires_in, fraction);
        assert!(
            renewal_at <= hard_expiry,
            "fraction {} produced a renewal instant past hard expiry",
            fraction
        );
    }
}

#[test]
fn test_next_renewal_with_full_fraction_equals_hard_expiry() {
    let issued_at = instant(1_700_000_000);

    let renewal_at = next_renewal_at(issued_at, 600, 1.0);

    assert_eq!(renewal_at, issued_at + TimeDelta::seconds(600));
}
