//! The top-level federation handle: wires routing, discovery, the inbox
//! pipeline, and the outbox delivery pipeline into one object an
//! application constructs once and shares across requests.

mod content_negotiation;
mod dispatch;
mod routes;

pub use content_negotiation::wants_activity_json;
pub use dispatch::{
    ActorDispatcher, ActorDispatcherFuture, AuthorizePredicate, CollectionDispatchResult,
    CollectionDispatcherFn, CollectionDispatcherFuture, DispatchTable, KeyPair, KeyPairsDispatcher,
    KeyPairsDispatcherFuture, NodeInfoDispatcher, NodeInfoDispatcherFuture, ObjectDispatcherEntry,
    ObjectDispatcherFn, ObjectDispatcherFuture, RequestContext,
};
pub use routes::{
    default_router, ROUTE_ACTOR, ROUTE_FOLLOWERS, ROUTE_FOLLOWING, ROUTE_INBOX,
    ROUTE_NODEINFO, ROUTE_NODEINFO_POINTER, ROUTE_OUTBOX, ROUTE_SHARED_INBOX, ROUTE_WEBFINGER,
};

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use apfed_config::FederationSettings;
use apfed_core::{ClassTag, Node, Recipient, SenderKeyPair};
use apfed_discovery::{build_webfinger_response, extract_acct_name, NodeInfoPointer, Webfinger};
use apfed_error::{ApfedError, Result};
use apfed_inbox::{ErrorHandler as InboxErrorHandler, Listener, ListenerRegistry};
use apfed_kv::KvStore;
use apfed_outbox::{DeliveryOptions, FailureHandler, FollowersResolver, Outbox, OutboxConfig, RecipientTarget};
use apfed_queue::MessageQueue;
use apfed_router::{Router, RouteMatch};
use apfed_telemetry::{InboxMetrics, OutboxMetrics};
use apfed_vocab::DocumentLoader;
use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};

/// Resolves a local account name to the actor's canonical URL and primary
/// class, for WebFinger. Kept as a plain callback rather than a trait since
/// the lookup is usually a single in-process store read.
pub type ActorLookup<'a> = &'a dyn Fn(&str) -> Option<(String, ClassTag)>;

/// Reads `inbox`/`endpoints.sharedInbox` off a dispatched actor `Node`,
/// the same shape `apfed_outbox::recipients` expects off a fetched actor.
fn actor_node_to_recipient(actor: &Node) -> Option<Recipient> {
    let actor_id = actor.id.clone()?;
    let inbox = actor.get("inbox").and_then(|slot| slot.first()).and_then(|v| v.id_only())?.to_string();
    let shared_inbox = actor
        .get("endpoints")
        .and_then(|slot| slot.first())
        .and_then(|v| v.as_parsed())
        .and_then(|endpoints| endpoints.get("sharedInbox"))
        .and_then(|slot| slot.first())
        .and_then(|v| v.id_only())
        .map(str::to_string);
    let mut recipient = Recipient::new(actor_id, inbox);
    if let Some(shared) = shared_inbox {
        recipient = recipient.with_shared_inbox(shared);
    }
    Some(recipient)
}

/// Expands the `"followers"` addressing token by walking the `"followers"`
/// collection dispatcher's pages, so `apfed_outbox` can stay ignorant of how
/// an application stores its followers.
struct DispatchTableFollowers {
    table: Arc<RwLock<DispatchTable>>,
    router: Router,
    domain: String,
}

impl DispatchTableFollowers {
    fn identifier_of(&self, actor_id: &str) -> Option<String> {
        for scheme in ["https://", "http://"] {
            let prefix = format!("{scheme}{}", self.domain);
            if let Some(path) = actor_id.strip_prefix(&prefix) {
                let matched = self.router.route(path)?;
                if matched.name == ROUTE_ACTOR {
                    return matched.values.get("identifier").cloned();
                }
            }
        }
        None
    }
}

#[async_trait]
impl FollowersResolver for DispatchTableFollowers {
    async fn followers(&self, sender_actor_id: &str) -> Result<Vec<Recipient>> {
        let identifier = self.identifier_of(sender_actor_id).ok_or_else(|| {
            ApfedError::malformed_input("sender actor id is not a local actor").with_context("actor_id", sender_actor_id)
        })?;

        let mut recipients = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let table = self.table.read().unwrap().clone();
            let ctx = RequestContext::new(format!("https://{}", self.domain));
            let page = table.dispatch_collection(ROUTE_FOLLOWERS, ctx, identifier.clone(), cursor.clone()).await?;
            match page {
                None => break,
                Some(CollectionDispatchResult::Container(container)) => {
                    cursor = container.first;
                    if cursor.is_none() {
                        break;
                    }
                }
                Some(CollectionDispatchResult::Page(page)) => {
                    recipients.extend(page.items.iter().filter_map(actor_node_to_recipient));
                    cursor = page.next_cursor;
                    if cursor.is_none() {
                        break;
                    }
                }
            }
        }
        Ok(recipients)
    }
}

/// The orchestrator an application constructs once: owns the route table,
/// the listener registry, the dispatch table, and the outbox's background
/// delivery loop.
pub struct Federation {
    domain: String,
    router: Router,
    listeners: ListenerRegistry,
    dispatch_table: Arc<RwLock<DispatchTable>>,
    kv: Arc<dyn KvStore>,
    loader: Arc<dyn DocumentLoader>,
    outbox: Arc<Outbox>,
    settings: FederationSettings,
    pub inbox_metrics: Arc<InboxMetrics>,
    pub outbox_metrics: Arc<OutboxMetrics>,
}

impl Federation {
    pub fn new(
        domain: impl Into<String>,
        settings: FederationSettings,
        kv: Arc<dyn KvStore>,
        queue: Arc<dyn MessageQueue>,
        loader: Arc<dyn DocumentLoader>,
        on_delivery_failure: Option<FailureHandler>,
    ) -> Result<Self> {
        let domain = domain.into();
        let router = default_router()?;
        let dispatch_table = Arc::new(RwLock::new(DispatchTable::new()));
        let followers: Arc<dyn FollowersResolver> = Arc::new(DispatchTableFollowers {
            table: dispatch_table.clone(),
            router: router.clone(),
            domain: domain.clone(),
        });
        let outbox_metrics = Arc::new(OutboxMetrics::default());
        let outbox_config = OutboxConfig {
            extra_transformers: Vec::new(),
            followers: Some(followers),
        };
        let outbox = Outbox::new(queue, settings.clone(), outbox_metrics.clone(), outbox_config, on_delivery_failure);
        Ok(Self {
            domain,
            router,
            listeners: ListenerRegistry::new(),
            dispatch_table,
            kv,
            loader,
            outbox,
            settings,
            inbox_metrics: Arc::new(InboxMetrics::default()),
            outbox_metrics,
        })
    }

    /// Registers additional application routes before the first request is
    /// served; has no effect on the reserved route names in [`routes`].
    pub fn add_route(&mut self, template: &str, name: &str) -> Result<Vec<String>> {
        self.router.add(template, name)
    }

    pub fn route(&self, path: &str) -> Option<RouteMatch> {
        self.router.route(path)
    }

    pub fn build_path(&self, name: &str, values: &BTreeMap<String, String>) -> Result<String> {
        self.router.build(name, values)
    }

    /// Registers the listener invoked for `tag` and its unregistered
    /// descendants. Fails if `tag` already has a listener.
    pub fn register_listener(&mut self, tag: ClassTag, listener: Listener) -> Result<()> {
        self.listeners.register(tag, listener)
    }

    /// Registers the actor dispatcher consulted by the actor endpoint and by
    /// WebFinger account resolution. Fails if one is already registered.
    pub fn register_actor_dispatcher(&self, dispatcher: ActorDispatcher) -> Result<()> {
        self.dispatch_table.write().unwrap().register_actor_dispatcher(dispatcher)
    }

    /// Registers the key-pairs dispatcher consulted to populate an actor's
    /// `publicKey`/`assertionMethod` and to sign requests on its behalf.
    pub fn register_key_pairs_dispatcher(&self, dispatcher: KeyPairsDispatcher) -> Result<()> {
        self.dispatch_table.write().unwrap().register_key_pairs_dispatcher(dispatcher)
    }

    /// Registers a named object dispatcher, consulted for any non-reserved
    /// route whose name equals `kind`.
    pub fn register_object_dispatcher(
        &self,
        kind: impl Into<String>,
        dispatch: ObjectDispatcherFn,
        authorize: Option<AuthorizePredicate>,
    ) -> Result<()> {
        self.dispatch_table.write().unwrap().register_object_dispatcher(kind, dispatch, authorize)
    }

    /// Registers a named collection dispatcher (`outbox`, `followers`,
    /// `following`, or an application-defined kind).
    pub fn register_collection_dispatcher(
        &self,
        kind: impl Into<String>,
        dispatcher: CollectionDispatcherFn,
    ) -> Result<()> {
        self.dispatch_table.write().unwrap().register_collection_dispatcher(kind, dispatcher)
    }

    /// Registers the dispatcher consulted to build the `/nodeinfo/2.1`
    /// document.
    pub fn register_nodeinfo_dispatcher(&self, dispatcher: NodeInfoDispatcher) -> Result<()> {
        self.dispatch_table.write().unwrap().register_nodeinfo_dispatcher(dispatcher)
    }

    /// Runs the full inbound pipeline (verify, dedup, authenticate, dispatch)
    /// against a raw inbox POST.
    pub async fn receive_activity(
        &self,
        request: &Request<Bytes>,
        on_error: Option<&InboxErrorHandler>,
    ) -> Result<()> {
        apfed_inbox::process_inbound(
            request,
            &self.listeners,
            self.kv.as_ref(),
            self.loader.as_ref(),
            self.settings.signature_skew,
            self.settings.idempotency_ttl,
            &self.inbox_metrics,
            on_error,
        )
        .await
    }

    /// Transforms, expands, coalesces, and delivers `activity` (sent by
    /// `sender_actor_id`) to `targets` — queued by default, or inline when
    /// `options.immediate` is set.
    pub async fn deliver_activity(
        &self,
        activity: Node,
        sender_actor_id: &str,
        targets: Vec<RecipientTarget>,
        sender_key: SenderKeyPair,
        options: DeliveryOptions,
    ) -> Result<()> {
        self.outbox
            .send_activity(activity, sender_actor_id, targets, sender_key, self.loader.as_ref(), options)
            .await
    }

    /// Answers a `resource=acct:name@domain` WebFinger query by looking up
    /// the local account through `lookup`.
    pub fn webfinger(&self, resource: &str, lookup: ActorLookup<'_>) -> Result<Webfinger> {
        let name = extract_acct_name(resource, &self.domain)?;
        let (actor_url, actor_type) = lookup(name)
            .ok_or_else(|| ApfedError::not_found("no such local account").with_context("name", name))?;
        Ok(build_webfinger_response(
            format!("acct:{name}@{}", self.domain),
            &actor_url,
            Some(actor_type.as_str()),
        ))
    }

    pub fn nodeinfo_pointer(&self, base_url: &str) -> NodeInfoPointer {
        NodeInfoPointer::for_base_url(base_url)
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn settings(&self) -> &FederationSettings {
        &self.settings
    }

    /// Answers a raw inbound request per the dispatch flow: route →
    /// dispatch → a `null` dispatcher result becomes 404 → JSON-LD
    /// emission content-negotiated against `Accept`. A framework adapter
    /// wraps this in whatever request/response types it uses; this crate
    /// stays framework-agnostic by working in `http`/`bytes` alone.
    pub async fn handle_request(&self, request: &Request<Bytes>) -> Response<Bytes> {
        match self.route_request(request).await {
            Ok(response) => response,
            Err(e) => self.error_response(&e),
        }
    }

    fn error_response(&self, error: &ApfedError) -> Response<Bytes> {
        let status = error.code().http_status().unwrap_or(500);
        let body = serde_json::to_vec(&error.to_dto()).unwrap_or_default();
        Response::builder()
            .status(status)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Bytes::from(body))
            .unwrap_or_else(|_| Response::new(Bytes::new()))
    }

    fn json_response(&self, status: u16, accept: Option<&str>, body: serde_json::Value) -> Result<Response<Bytes>> {
        let content_type = if wants_activity_json(accept) {
            "application/activity+json"
        } else {
            "application/ld+json; profile=\"https://www.w3.org/ns/activitystreams\""
        };
        let payload = serde_json::to_vec(&body)
            .map_err(|e| ApfedError::internal("failed to serialize response body").with_source(e))?;
        Response::builder()
            .status(status)
            .header(http::header::CONTENT_TYPE, content_type)
            .body(Bytes::from(payload))
            .map_err(|e| ApfedError::internal("failed to build response").with_source(e))
    }

    async fn route_request(&self, request: &Request<Bytes>) -> Result<Response<Bytes>> {
        let path = request.uri().path().to_string();
        let query = request.uri().query().unwrap_or("").to_string();
        let accept = request.headers().get(http::header::ACCEPT).and_then(|v| v.to_str().ok());
        let matched = self.route(&path).ok_or_else(|| ApfedError::not_found("no route matches this path"))?;
        let base_url = format!("https://{}", self.domain);
        let ctx = RequestContext::new(base_url.clone());

        match matched.name.as_str() {
            ROUTE_ACTOR => self.handle_actor(&matched, ctx, accept).await,
            ROUTE_INBOX | ROUTE_SHARED_INBOX => self.handle_inbox(request).await,
            ROUTE_OUTBOX | ROUTE_FOLLOWERS | ROUTE_FOLLOWING => {
                self.handle_collection(&matched, ctx, &query, accept).await
            }
            ROUTE_WEBFINGER => self.handle_webfinger_request(&query).await,
            ROUTE_NODEINFO_POINTER => {
                let pointer = self.nodeinfo_pointer(&base_url);
                let body = serde_json::to_value(&pointer)
                    .map_err(|e| ApfedError::internal("failed to serialize nodeinfo pointer").with_source(e))?;
                self.json_response(200, accept, body)
            }
            ROUTE_NODEINFO => self.handle_nodeinfo(ctx, accept).await,
            other => self.handle_object(other, &matched, ctx, accept).await,
        }
    }

    async fn handle_actor(&self, matched: &RouteMatch, ctx: RequestContext, accept: Option<&str>) -> Result<Response<Bytes>> {
        let identifier = matched.values.get("identifier").cloned().unwrap_or_default();
        let table = self.dispatch_table.read().unwrap().clone();
        let Some(mut actor) = table.dispatch_actor(ctx.clone(), identifier.clone()).await? else {
            return Err(ApfedError::not_found("no such actor").with_context("identifier", identifier));
        };
        let key_pairs = table.dispatch_key_pairs(ctx, identifier).await?;
        if let Some((principal, rest)) = key_pairs.split_first() {
            actor.set("publicKey", key_to_property(&principal.public_key));
            if !rest.is_empty() {
                actor.set_multi(
                    "assertionMethod",
                    rest.iter().map(|pair| key_to_property(&pair.public_key)).collect(),
                );
            }
        }
        self.json_response(200, accept, apfed_vocab::to_json_ld(&actor))
    }

    async fn handle_inbox(&self, request: &Request<Bytes>) -> Result<Response<Bytes>> {
        self.receive_activity(request, None).await?;
        Response::builder()
            .status(202)
            .body(Bytes::new())
            .map_err(|e| ApfedError::internal("failed to build response").with_source(e))
    }

    async fn handle_collection(
        &self,
        matched: &RouteMatch,
        ctx: RequestContext,
        query: &str,
        accept: Option<&str>,
    ) -> Result<Response<Bytes>> {
        let identifier = matched.values.get("identifier").cloned().unwrap_or_default();
        let cursor = query_param(query, "cursor");
        let table = self.dispatch_table.read().unwrap().clone();
        let Some(result) = table.dispatch_collection(&matched.name, ctx, identifier.clone(), cursor).await? else {
            return Err(ApfedError::not_found("no such collection").with_context("identifier", identifier));
        };
        let body = match result {
            CollectionDispatchResult::Container(container) => serde_json::json!({
                "type": "OrderedCollection",
                "first": container.first,
                "last": container.last,
                "totalItems": container.total_items,
            }),
            CollectionDispatchResult::Page(page) => serde_json::json!({
                "type": "OrderedCollectionPage",
                "items": page.items.iter().map(apfed_vocab::to_json_ld).collect::<Vec<_>>(),
                "prev": page.prev_cursor,
                "next": page.next_cursor,
            }),
        };
        self.json_response(200, accept, body)
    }

    async fn handle_webfinger_request(&self, query: &str) -> Result<Response<Bytes>> {
        let resource = query_param(query, "resource")
            .ok_or_else(|| ApfedError::malformed_input("missing resource query parameter"))?;
        let name = extract_acct_name(&resource, &self.domain)?.to_string();
        let table = self.dispatch_table.read().unwrap().clone();
        let ctx = RequestContext::new(format!("https://{}", self.domain));
        let Some(actor) = table.dispatch_actor(ctx, name.clone()).await? else {
            return Err(ApfedError::not_found("no such local account").with_context("name", name));
        };
        let actor_url = actor.id.clone().ok_or_else(|| ApfedError::internal("dispatched actor has no id"))?;
        let webfinger = build_webfinger_response(
            format!("acct:{name}@{}", self.domain),
            &actor_url,
            actor.primary_type().map(ClassTag::as_str),
        );
        let payload = serde_json::to_vec(&webfinger)
            .map_err(|e| ApfedError::internal("failed to serialize webfinger response").with_source(e))?;
        Response::builder()
            .status(200)
            .header(http::header::CONTENT_TYPE, "application/jrd+json")
            .body(Bytes::from(payload))
            .map_err(|e| ApfedError::internal("failed to build response").with_source(e))
    }

    async fn handle_nodeinfo(&self, ctx: RequestContext, accept: Option<&str>) -> Result<Response<Bytes>> {
        let table = self.dispatch_table.read().unwrap().clone();
        let Some(info) = table.dispatch_node_info(ctx).await? else {
            return Err(ApfedError::not_found("no nodeinfo dispatcher registered"));
        };
        let body = serde_json::to_value(&info)
            .map_err(|e| ApfedError::internal("failed to serialize nodeinfo document").with_source(e))?;
        self.json_response(200, accept, body)
    }

    /// Falls through to a named object dispatcher for any route that is
    /// neither reserved nor a collection — the generic half of §4.4's
    /// per-object-kind dispatch.
    async fn handle_object(
        &self,
        kind: &str,
        matched: &RouteMatch,
        ctx: RequestContext,
        accept: Option<&str>,
    ) -> Result<Response<Bytes>> {
        let table = self.dispatch_table.read().unwrap().clone();
        if !table.has_object_dispatcher(kind) {
            return Err(ApfedError::not_found("no dispatcher registered for this route").with_context("route", kind));
        }
        let Some(object) = table.dispatch_object(kind, ctx, matched.values.clone()).await? else {
            return Err(ApfedError::not_found("object dispatcher returned no object").with_context("route", kind));
        };
        self.json_response(200, accept, apfed_vocab::to_json_ld(&object))
    }
}

fn key_to_property(key: &apfed_core::CryptographicKey) -> apfed_core::PropertyValue {
    apfed_core::PropertyValue::Scalar(serde_json::json!({
        "id": key.id,
        "owner": key.owner,
        "publicKeyPem": key.public_key_pem,
    }))
}

/// Decodes the value of `key` out of a raw (already-unprefixed) query string.
fn query_param(query: &str, key: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let mut parts = pair.splitn(2, '=');
        if parts.next()? != key {
            return None;
        }
        let raw = parts.next().unwrap_or("");
        Some(urlencoding::decode(raw).map(|c| c.into_owned()).unwrap_or_else(|_| raw.to_string()))
    })
}
