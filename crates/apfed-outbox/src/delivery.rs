//! A single HTTP delivery attempt: sign, POST, classify the outcome.

use bytes::Bytes;
use http::{Request, StatusCode};
use rsa::RsaPrivateKey;

use apfed_core::SenderKeyPair;
use apfed_error::{ApfedError, Result};
use apfed_sig::{load_private_key, sign_request};

/// How a delivery attempt's outcome should be treated by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Delivered,
    Transient,
    Permanent,
}

/// Classifies an HTTP status per the delivery design: 2xx succeeds; 408 and
/// 429 (despite being 4xx) are treated as transient since the receiving
/// server is asking for a retry; the rest of 4xx is permanent; 5xx and
/// anything else is transient.
pub fn classify_status(status: StatusCode) -> Outcome {
    if status.is_success() {
        Outcome::Delivered
    } else if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::TOO_MANY_REQUESTS {
        Outcome::Transient
    } else if status.is_client_error() {
        Outcome::Permanent
    } else {
        Outcome::Transient
    }
}

/// Signs and POSTs `body` to `inbox`, returning the classified outcome.
/// Network-level failures (timeouts, connection errors, DNS) are always
/// transient.
pub async fn deliver(
    client: &reqwest::Client,
    inbox: &str,
    body: Bytes,
    sender_key: &SenderKeyPair,
    user_agent: &str,
) -> Result<Outcome> {
    let private_key: RsaPrivateKey = load_private_key(&sender_key.private_key_pem)?;

    let mut request = Request::post(inbox)
        .header("content-type", "application/activity+json")
        .body(body)
        .map_err(|e| ApfedError::malformed_input("invalid inbox URL").with_source(e))?;
    sign_request(&mut request, &private_key, &sender_key.public_key_id)?;

    let mut builder = client
        .post(inbox)
        .header("user-agent", user_agent)
        .body(request.body().clone());
    for (name, value) in request.headers() {
        if name == "host" {
            continue; // reqwest sets this from the URL itself
        }
        builder = builder.header(name, value);
    }

    let response = match builder.send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(target: "apfed.outbox", inbox, error = %e, "delivery request failed");
            return Ok(Outcome::Transient);
        }
    };

    let outcome = classify_status(response.status());
    if outcome != Outcome::Delivered {
        tracing::warn!(target: "apfed.outbox", inbox, status = %response.status(), ?outcome, "delivery not successful");
    }
    Ok(outcome)
}
