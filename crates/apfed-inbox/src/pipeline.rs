//! The seven-step inbound activity pipeline: verify, parse, require
//! identity, dedup, authenticate, dispatch, invoke.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use apfed_core::{ClassTag, Node, PropertyValue};
use apfed_error::{ApfedError, Result};
use apfed_kv::{KvStore, SetOptions};
use apfed_sig::verify_request;
use apfed_telemetry::InboxMetrics;
use apfed_vocab::{from_json_ld, DocumentLoader};
use bytes::Bytes;
use http::Request;

use crate::key_resolver::ActorKeyResolver;
use crate::registry::ListenerRegistry;

/// Invoked when dispatch or the listener itself fails, so the application
/// can record or surface the failure without the pipeline dictating policy.
pub type ErrorHandler = Arc<dyn Fn(ApfedError) + Send + Sync>;

fn actor_id_of(activity: &Node) -> Option<&str> {
    activity.get("actor").and_then(|slot| slot.first()).and_then(|v| v.id_only())
}

/// The actor IDs whose signing key is allowed to author `activity`. Ordinary
/// activities accept only their own actor; `Undo<Follow>` additionally
/// accepts the actor of the `Follow` being undone, since some
/// implementations ask the *followed* actor's system to countersign the
/// undo on the follower's behalf.
fn authorized_actor_ids(activity: &Node) -> Vec<String> {
    let mut ids = Vec::new();
    if let Some(actor) = actor_id_of(activity) {
        ids.push(actor.to_string());
    }
    if activity.primary_type() == Some(ClassTag::Undo) {
        if let Some(inner) = activity
            .get("object")
            .and_then(|slot| slot.first())
            .and_then(PropertyValue::as_parsed)
        {
            if inner.primary_type() == Some(ClassTag::Follow) {
                if let Some(inner_actor) = actor_id_of(inner) {
                    ids.push(inner_actor.to_string());
                }
            }
        }
    }
    ids
}

fn key_owner(key: &apfed_core::CryptographicKey) -> String {
    key.owner
        .clone()
        .unwrap_or_else(|| key.id.split('#').next().unwrap_or(&key.id).to_string())
}

/// Runs the full inbound pipeline against a raw HTTP request. Returns `Ok`
/// once the activity has been accepted (including the idempotent "already
/// seen" case). A listener error is reported through `on_error` (so the
/// application can record it) and also returned here as an `Internal`
/// error, so the HTTP layer can still reply `500` instead of `202` —
/// `on_error` does not replace the return value, it supplements it.
#[allow(clippy::too_many_arguments)]
pub async fn process_inbound(
    request: &Request<Bytes>,
    registry: &ListenerRegistry,
    kv: &dyn KvStore,
    loader: &dyn DocumentLoader,
    signature_skew: Duration,
    idempotency_ttl: Duration,
    metrics: &InboxMetrics,
    on_error: Option<&ErrorHandler>,
) -> Result<()> {
    metrics.received.fetch_add(1, Ordering::Relaxed);

    let resolver = ActorKeyResolver::new(loader);
    let key = match verify_request(request, &resolver, signature_skew).await {
        Some(key) => key,
        None => {
            metrics.unauthenticated.fetch_add(1, Ordering::Relaxed);
            return Err(ApfedError::invalid_signature("request signature did not verify"));
        }
    };

    let document: serde_json::Value = serde_json::from_slice(request.body())
        .map_err(|e| ApfedError::malformed_input("request body is not valid JSON").with_source(e))?;
    let activity = from_json_ld(&document)?;

    let activity_id = activity
        .id
        .clone()
        .ok_or_else(|| ApfedError::malformed_input("activity has no id"))?;
    if actor_id_of(&activity).is_none() {
        return Err(ApfedError::malformed_input("activity has no actor"));
    }

    let inserted = kv
        .set_if_absent(
            &vec!["inbox".to_string(), "seen".to_string(), activity_id.clone()],
            Vec::new(),
            SetOptions::with_ttl(idempotency_ttl),
        )
        .await?;
    if !inserted {
        metrics.deduplicated.fetch_add(1, Ordering::Relaxed);
        return Ok(());
    }

    let owner = key_owner(&key);
    if !authorized_actor_ids(&activity).iter().any(|id| id == &owner) {
        metrics.unauthenticated.fetch_add(1, Ordering::Relaxed);
        return Err(ApfedError::invalid_signature("signing key does not own the activity's actor")
            .with_context("activity_id", activity_id));
    }

    let Some(tag) = activity.primary_type() else {
        return Err(ApfedError::malformed_input("activity has no declared type"));
    };
    let Some((_, listener)) = registry.dispatch(tag) else {
        return Err(ApfedError::not_found(format!("no listener registered for {tag} or its ancestors")));
    };

    metrics.dispatched.fetch_add(1, Ordering::Relaxed);
    if let Err(e) = listener(activity).await {
        metrics.listener_errors.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(target: "apfed.inbox", error = %e, "listener returned an error");
        if let Some(handler) = on_error {
            handler(e);
        }
        return Err(ApfedError::internal("listener returned an error"));
    }
    Ok(())
}
