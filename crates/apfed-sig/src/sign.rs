//! Outgoing request signing per the HTTP Signatures component design.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use chrono::Utc;
use http::{HeaderName, HeaderValue, Request};
use rsa::pkcs1v15::SigningKey;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::RsaPrivateKey;
use sha2::Sha256;

use apfed_error::{ApfedError, Result};

use crate::digest::compute_sha256_digest_header;
use crate::header::SignatureHeader;

const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Signs `request` in place: ensures `Host`, `Date`, and (for bodies)
/// `Digest` are present, builds the canonical signing string, and attaches
/// a `Signature` header covering those plus `(request-target)`.
pub fn sign_request(
    request: &mut Request<Bytes>,
    private_key: &RsaPrivateKey,
    key_id: &str,
) -> Result<()> {
    let method = request.method().clone();
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let host = request
        .uri()
        .host()
        .ok_or_else(|| ApfedError::malformed_input("request URI has no host"))?
        .to_string();
    let host = match request.uri().port_u16() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    };
    request
        .headers_mut()
        .insert(HeaderName::from_static("host"), header_value(&host)?);

    if !request.headers().contains_key("date") {
        let date = Utc::now().format(DATE_FORMAT).to_string();
        request
            .headers_mut()
            .insert(HeaderName::from_static("date"), header_value(&date)?);
    }

    let has_body = !matches!(method, http::Method::GET | http::Method::HEAD);
    if has_body {
        let digest = compute_sha256_digest_header(request.body());
        request
            .headers_mut()
            .insert(HeaderName::from_static("digest"), header_value(&digest)?);
    }

    let mut signed_headers = vec!["host".to_string(), "date".to_string()];
    if has_body {
        signed_headers.push("digest".to_string());
    }

    let signing_string = build_signing_string(
        method.as_str(),
        &path_and_query,
        &signed_headers,
        request.headers(),
    )?;

    let mut rng = rand::thread_rng();
    let signing_key = SigningKey::<Sha256>::new(private_key.clone());
    let signature = signing_key.sign_with_rng(&mut rng, signing_string.as_bytes());

    let header = SignatureHeader {
        key_id: key_id.to_string(),
        headers: signed_headers,
        signature: BASE64.encode(signature.to_bytes()),
    };
    request.headers_mut().insert(
        HeaderName::from_static("signature"),
        header_value(&header.to_header_value())?,
    );
    Ok(())
}

fn header_value(s: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(s).map_err(|e| ApfedError::malformed_input("invalid header value").with_source(e))
}

/// Builds `(request-target): <method> <path>` followed by each named
/// header, one per line, as `name: value-trimmed`.
pub(crate) fn build_signing_string(
    method: &str,
    path_and_query: &str,
    headers: &[String],
    header_map: &http::HeaderMap,
) -> Result<String> {
    let mut lines = vec![format!(
        "(request-target): {} {}",
        method.to_ascii_lowercase(),
        path_and_query
    )];
    for name in headers {
        if name == "(request-target)" {
            continue;
        }
        let value = header_map
            .get(name.as_str())
            .ok_or_else(|| ApfedError::malformed_input(format!("missing header to sign: {name}")))?
            .to_str()
            .map_err(|e| ApfedError::malformed_input("non-UTF8 header value").with_source(e))?
            .trim();
        lines.push(format!("{name}: {value}"));
    }
    Ok(lines.join("\n"))
}
