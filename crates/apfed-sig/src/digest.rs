//! `Digest` header computation and verification.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest as _, Sha256, Sha512};

/// Builds the `Digest: sha-256=<base64>` header value for `body`.
pub fn compute_sha256_digest_header(body: &[u8]) -> String {
    let hash = Sha256::digest(body);
    format!("sha-256={}", BASE64.encode(hash))
}

/// Checks `header_value` (possibly several comma-separated `alg=value`
/// pairs) against `body`, accepting if any supported algorithm
/// (`sha`, `sha-256`, `sha-512`) matches the recomputed digest.
pub fn verify_digest_header(header_value: &str, body: &[u8]) -> bool {
    for entry in header_value.split(',') {
        let Some((alg, value)) = entry.split_once('=') else {
            continue;
        };
        let alg = alg.trim().to_ascii_lowercase();
        let value = value.trim();
        let expected = match alg.as_str() {
            "sha-256" | "sha" => BASE64.encode(Sha256::digest(body)),
            "sha-512" => BASE64.encode(Sha512::digest(body)),
            _ => continue,
        };
        if expected == value {
            return true;
        }
    }
    false
}
