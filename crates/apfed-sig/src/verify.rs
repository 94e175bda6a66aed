//! Incoming request verification per the HTTP Signatures component design.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::Request;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use sha2::Sha256;

use apfed_core::CryptographicKey;
use apfed_error::Result;

use crate::digest::verify_digest_header;
use crate::header::SignatureHeader;
use crate::key::load_public_key;
use crate::sign::build_signing_string;

/// Resolves a `keyId` IRI to the [`CryptographicKey`] it names. The loaded
/// document may be a bare key or an actor containing one; this trait hides
/// that shape-resolution from the signature verifier. Returns `Ok(None)`
/// when the key cannot be resolved, including on network failure — per the
/// component design, resolution failure yields "no match", not an error.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    async fn resolve_key(&self, key_id: &str) -> Result<Option<CryptographicKey>>;
}

/// Verifies an inbound request. Returns the resolved key on success, `None`
/// on any verification failure (missing headers, clock skew, bad
/// signature, unresolvable key) — never an `Err` for ordinary failure
/// modes, matching the "return none, don't throw" procedure.
pub async fn verify_request(
    request: &Request<Bytes>,
    resolver: &dyn KeyResolver,
    skew: Duration,
) -> Option<CryptographicKey> {
    let headers = request.headers();
    let date_raw = headers.get("date")?.to_str().ok()?;
    let signature_raw = headers.get("signature")?.to_str().ok()?;
    let has_body = !request.body().is_empty();
    if has_body && !headers.contains_key("digest") {
        return None;
    }

    if let Some(digest_header) = headers.get("digest") {
        let digest_raw = digest_header.to_str().ok()?;
        if !verify_digest_header(digest_raw, request.body()) {
            return None;
        }
    }

    if !within_skew(date_raw, skew) {
        return None;
    }

    let parsed = SignatureHeader::parse(signature_raw).ok()?;
    if !parsed.headers.iter().any(|h| h == "(request-target)") {
        return None;
    }
    if !parsed.headers.iter().any(|h| h == "date") {
        return None;
    }
    if has_body && !parsed.headers.iter().any(|h| h == "digest") {
        return None;
    }

    let key = resolver.resolve_key(&parsed.key_id).await.ok().flatten()?;
    let public_key = load_public_key(&key.public_key_pem).ok()?;

    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let signing_string = build_signing_string(
        request.method().as_str(),
        &path_and_query,
        &parsed.headers,
        headers,
    )
    .ok()?;

    let signature_bytes = BASE64.decode(parsed.signature).ok()?;
    let signature = Signature::try_from(signature_bytes.as_slice()).ok()?;
    if verify_signature_bytes(&public_key, signing_string.as_bytes(), &signature) {
        Some(key)
    } else {
        None
    }
}

fn verify_signature_bytes(public_key: &RsaPublicKey, message: &[u8], signature: &Signature) -> bool {
    let verifying_key = VerifyingKey::<Sha256>::new(public_key.clone());
    verifying_key.verify(message, signature).is_ok()
}

fn within_skew(date_raw: &str, skew: Duration) -> bool {
    let Ok(parsed) = DateTime::parse_from_rfc2822(date_raw) else {
        return false;
    };
    let parsed: DateTime<Utc> = parsed.with_timezone(&Utc);
    let now = Utc::now();
    let delta = (now - parsed).num_milliseconds().abs() as u64;
    delta <= skew.as_millis() as u64
}
