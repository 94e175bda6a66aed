//! Inbound activity handling: signature verification, idempotent dedup,
//! actor authentication, and class-tag-based listener dispatch.

mod key_resolver;
mod pipeline;
mod registry;

pub use key_resolver::ActorKeyResolver;
pub use pipeline::{process_inbound, ErrorHandler};
pub use registry::{Listener, ListenerFuture, ListenerRegistry};

#[cfg(test)]
mod tests {
    use super::*;
    use apfed_core::{ClassTag, Node, PropertyValue};
    use apfed_error::Result;
    use apfed_kv::InMemoryKv;
    use apfed_sig::sign_request;
    use apfed_telemetry::InboxMetrics;
    use apfed_vocab::{to_json_ld, DocumentLoader};
    use async_trait::async_trait;
    use bytes::Bytes;
    use http::Request;
    use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
    use rsa::RsaPrivateKey;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct FixtureLoader(HashMap<String, Value>);

    #[async_trait]
    impl DocumentLoader for FixtureLoader {
        async fn load(&self, iri: &str) -> Result<Value> {
            self.0
                .get(iri)
                .cloned()
                .ok_or_else(|| apfed_error::ApfedError::not_found("no such fixture"))
        }
    }

    struct Fixture {
        loader: FixtureLoader,
        key: RsaPrivateKey,
        key_id: String,
    }

    fn build_fixture(actor_id: &str) -> Fixture {
        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let key_id = format!("{actor_id}#main-key");
        let public_pem = key.to_public_key().to_public_key_pem(LineEnding::LF).unwrap();

        let mut docs = HashMap::new();
        docs.insert(
            actor_id.to_string(),
            serde_json::json!({
                "@type": "Person",
                "id": actor_id,
                "publicKey": {
                    "id": key_id,
                    "owner": actor_id,
                    "publicKeyPem": public_pem,
                },
            }),
        );
        Fixture {
            loader: FixtureLoader(docs),
            key,
            key_id,
        }
    }

    fn signed_post(fixture: &Fixture, activity: &Node) -> Request<Bytes> {
        let body = serde_json::to_vec(&to_json_ld(activity)).unwrap();
        let mut request = Request::post("https://b.example/inbox")
            .body(Bytes::from(body))
            .unwrap();
        sign_request(&mut request, &fixture.key, &fixture.key_id).unwrap();
        request
    }

    fn follow_activity(id: &str, actor: &str, object: &str) -> Node {
        let mut activity = Node::new(vec![ClassTag::Follow]).with_id(id);
        activity.set("actor", PropertyValue::Iri(actor.to_string()));
        activity.set("object", PropertyValue::Iri(object.to_string()));
        activity
    }

    fn registry_with_counter(tag: ClassTag) -> (ListenerRegistry, Arc<AtomicU32>) {
        let counter = Arc::new(AtomicU32::new(0));
        let counter2 = counter.clone();
        let mut registry = ListenerRegistry::new();
        registry
            .register(
                tag,
                Arc::new(move |_activity: Node| {
                    let counter = counter2.clone();
                    Box::pin(async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                }),
            )
            .unwrap();
        (registry, counter)
    }

    #[tokio::test]
    async fn duplicate_delivery_invokes_listener_exactly_once() {
        let fixture = build_fixture("https://a.example/users/1");
        let activity = follow_activity(
            "https://a.example/activities/1",
            "https://a.example/users/1",
            "https://b.example/users/2",
        );
        let request = signed_post(&fixture, &activity);
        let (registry, counter) = registry_with_counter(ClassTag::Follow);
        let kv = InMemoryKv::new();
        let metrics = InboxMetrics::default();

        for _ in 0..2 {
            process_inbound(
                &request,
                &registry,
                &kv,
                &fixture.loader,
                Duration::from_secs(30),
                Duration::from_secs(604800),
                &metrics,
                None,
            )
            .await
            .unwrap();
        }

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.deduplicated.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.dispatched.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn listener_registered_on_ancestor_class_still_dispatches() {
        let fixture = build_fixture("https://a.example/users/1");
        let activity = follow_activity(
            "https://a.example/activities/2",
            "https://a.example/users/1",
            "https://b.example/users/2",
        );
        let request = signed_post(&fixture, &activity);
        let (registry, counter) = registry_with_counter(ClassTag::Activity);
        let kv = InMemoryKv::new();
        let metrics = InboxMetrics::default();

        process_inbound(
            &request,
            &registry,
            &kv,
            &fixture.loader,
            Duration::from_secs(30),
            Duration::from_secs(604800),
            &metrics,
            None,
        )
        .await
        .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsigned_request_is_rejected_before_dispatch() {
        let fixture = build_fixture("https://a.example/users/1");
        let activity = follow_activity(
            "https://a.example/activities/3",
            "https://a.example/users/1",
            "https://b.example/users/2",
        );
        let body = serde_json::to_vec(&to_json_ld(&activity)).unwrap();
        let request = Request::post("https://b.example/inbox").body(Bytes::from(body)).unwrap();
        let (registry, counter) = registry_with_counter(ClassTag::Follow);
        let kv = InMemoryKv::new();
        let metrics = InboxMetrics::default();

        let err = process_inbound(
            &request,
            &registry,
            &kv,
            &fixture.loader,
            Duration::from_secs(30),
            Duration::from_secs(604800),
            &metrics,
            None,
        )
        .await
        .unwrap_err();

        assert_eq!(err.code(), apfed_error::ErrorCode::InvalidSignature);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(metrics.unauthenticated.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn undo_follow_signed_by_followed_actor_is_authenticated() {
        // The Undo is posted by the originally-followed actor's key, countersigning
        // on behalf of the follower who issued the Follow being undone.
        let follower = "https://a.example/users/1";
        let followed_fixture = build_fixture("https://b.example/users/2");

        let follow = follow_activity("https://a.example/activities/4", follower, "https://b.example/users/2");
        let mut undo = Node::new(vec![ClassTag::Undo]).with_id("https://a.example/activities/5");
        undo.set("actor", PropertyValue::Iri(follower.to_string()));
        undo.set("object", PropertyValue::Parsed(Box::new(follow)));

        let request = signed_post(&followed_fixture, &undo);
        let (registry, counter) = registry_with_counter(ClassTag::Undo);
        let kv = InMemoryKv::new();
        let metrics = InboxMetrics::default();

        process_inbound(
            &request,
            &registry,
            &kv,
            &followed_fixture.loader,
            Duration::from_secs(30),
            Duration::from_secs(604800),
            &metrics,
            None,
        )
        .await
        .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn listener_error_reaches_error_handler() {
        let fixture = build_fixture("https://a.example/users/1");
        let activity = follow_activity(
            "https://a.example/activities/6",
            "https://a.example/users/1",
            "https://b.example/users/2",
        );
        let request = signed_post(&fixture, &activity);

        let mut registry = ListenerRegistry::new();
        registry
            .register(
                ClassTag::Follow,
                Arc::new(|_activity: Node| Box::pin(async { Err(apfed_error::ApfedError::internal("boom")) })),
            )
            .unwrap();

        let handled = Arc::new(Mutex::new(Vec::new()));
        let handled2 = handled.clone();
        let handler: ErrorHandler = Arc::new(move |e| handled2.lock().unwrap().push(e.message().to_string()));

        let kv = InMemoryKv::new();
        let metrics = InboxMetrics::default();
        let err = process_inbound(
            &request,
            &registry,
            &kv,
            &fixture.loader,
            Duration::from_secs(30),
            Duration::from_secs(604800),
            &metrics,
            Some(&handler),
        )
        .await
        .unwrap_err();

        assert_eq!(err.code(), apfed_error::ErrorCode::Internal);
        assert_eq!(handled.lock().unwrap().as_slice(), ["boom"]);
        assert_eq!(metrics.listener_errors.load(Ordering::Relaxed), 1);
    }
}
