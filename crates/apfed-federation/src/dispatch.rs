//! The dispatch table: typed callbacks an application registers for each
//! endpoint kind, keyed and invoked the same way `apfed_inbox::ListenerRegistry`
//! keys and invokes inbox listeners. `Federation::handle_request` consults
//! this table to answer every dispatch-capable route.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use apfed_collection::{CollectionContainer, CollectionPage};
use apfed_core::{CryptographicKey, Node};
use apfed_discovery::NodeInfo;
use apfed_error::{ApfedError, Result};

/// Request-scoped values a dispatcher needs to build absolute URLs or
/// inspect the identity signature verification bound, without this crate
/// depending on an HTTP request type.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub base_url: String,
    pub authenticated_actor: Option<String>,
}

impl RequestContext {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            authenticated_actor: None,
        }
    }

    #[must_use]
    pub fn with_authenticated_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.authenticated_actor = Some(actor_id.into());
        self
    }
}

/// One key pair an actor advertises. The principal pair (the first one a
/// key-pairs dispatcher returns) is emitted as `publicKey`; the rest become
/// `assertionMethod` entries.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub private_key_pem: String,
    pub public_key: CryptographicKey,
}

pub type ActorDispatcherFuture = Pin<Box<dyn Future<Output = Result<Option<Node>>> + Send>>;
pub type ActorDispatcher = Arc<dyn Fn(RequestContext, String) -> ActorDispatcherFuture + Send + Sync>;

pub type KeyPairsDispatcherFuture = Pin<Box<dyn Future<Output = Result<Vec<KeyPair>>> + Send>>;
pub type KeyPairsDispatcher = Arc<dyn Fn(RequestContext, String) -> KeyPairsDispatcherFuture + Send + Sync>;

pub type ObjectDispatcherFuture = Pin<Box<dyn Future<Output = Result<Option<Node>>> + Send>>;
pub type ObjectDispatcherFn =
    Arc<dyn Fn(RequestContext, BTreeMap<String, String>) -> ObjectDispatcherFuture + Send + Sync>;
/// `(route values, authenticated actor) -> authorized?`, consulted before
/// the object dispatcher itself is invoked.
pub type AuthorizePredicate = Arc<dyn Fn(&BTreeMap<String, String>, Option<&str>) -> bool + Send + Sync>;

pub struct ObjectDispatcherEntry {
    pub dispatch: ObjectDispatcherFn,
    pub authorize: Option<AuthorizePredicate>,
}

/// Distinguishes the no-cursor container page from a page of items at a
/// specific cursor, so one collection kind can serve both shapes.
pub enum CollectionDispatchResult {
    Container(CollectionContainer),
    Page(CollectionPage<Node>),
}

pub type CollectionDispatcherFuture =
    Pin<Box<dyn Future<Output = Result<Option<CollectionDispatchResult>>> + Send>>;
/// `(context, identifier, cursor)`; `cursor` is `None` for the container request.
pub type CollectionDispatcherFn =
    Arc<dyn Fn(RequestContext, String, Option<String>) -> CollectionDispatcherFuture + Send + Sync>;

pub type NodeInfoDispatcherFuture = Pin<Box<dyn Future<Output = Result<NodeInfo>> + Send>>;
pub type NodeInfoDispatcher = Arc<dyn Fn(RequestContext) -> NodeInfoDispatcherFuture + Send + Sync>;

/// The registry of application-supplied endpoint handlers. Unlike
/// [`apfed_inbox::ListenerRegistry`], most slots here are singular (one
/// actor dispatcher, one key-pairs dispatcher, one NodeInfo dispatcher);
/// only object and collection dispatchers are keyed by name, since an
/// application serves more than one named object or collection kind.
#[derive(Default, Clone)]
pub struct DispatchTable {
    actor: Option<ActorDispatcher>,
    key_pairs: Option<KeyPairsDispatcher>,
    objects: BTreeMap<String, Arc<ObjectDispatcherEntry>>,
    collections: BTreeMap<String, CollectionDispatcherFn>,
    node_info: Option<NodeInfoDispatcher>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_actor_dispatcher(&mut self, dispatcher: ActorDispatcher) -> Result<()> {
        if self.actor.is_some() {
            return Err(ApfedError::duplicate_registration("actor dispatcher already registered"));
        }
        self.actor = Some(dispatcher);
        Ok(())
    }

    pub fn register_key_pairs_dispatcher(&mut self, dispatcher: KeyPairsDispatcher) -> Result<()> {
        if self.key_pairs.is_some() {
            return Err(ApfedError::duplicate_registration("key-pairs dispatcher already registered"));
        }
        self.key_pairs = Some(dispatcher);
        Ok(())
    }

    pub fn register_object_dispatcher(
        &mut self,
        kind: impl Into<String>,
        dispatch: ObjectDispatcherFn,
        authorize: Option<AuthorizePredicate>,
    ) -> Result<()> {
        let kind = kind.into();
        if self.objects.contains_key(&kind) {
            return Err(ApfedError::duplicate_registration(format!(
                "object dispatcher already registered for {kind}"
            )));
        }
        self.objects.insert(kind, Arc::new(ObjectDispatcherEntry { dispatch, authorize }));
        Ok(())
    }

    pub fn register_collection_dispatcher(
        &mut self,
        kind: impl Into<String>,
        dispatcher: CollectionDispatcherFn,
    ) -> Result<()> {
        let kind = kind.into();
        if self.collections.contains_key(&kind) {
            return Err(ApfedError::duplicate_registration(format!(
                "collection dispatcher already registered for {kind}"
            )));
        }
        self.collections.insert(kind, dispatcher);
        Ok(())
    }

    pub fn register_nodeinfo_dispatcher(&mut self, dispatcher: NodeInfoDispatcher) -> Result<()> {
        if self.node_info.is_some() {
            return Err(ApfedError::duplicate_registration("nodeinfo dispatcher already registered"));
        }
        self.node_info = Some(dispatcher);
        Ok(())
    }

    /// `Ok(None)` both when nothing is registered and when the dispatcher
    /// itself returns `null`; callers map either to 404 per the dispatch
    /// flow's step 3.
    pub async fn dispatch_actor(&self, ctx: RequestContext, identifier: String) -> Result<Option<Node>> {
        match &self.actor {
            Some(dispatcher) => dispatcher(ctx, identifier).await,
            None => Ok(None),
        }
    }

    pub async fn dispatch_key_pairs(&self, ctx: RequestContext, identifier: String) -> Result<Vec<KeyPair>> {
        match &self.key_pairs {
            Some(dispatcher) => dispatcher(ctx, identifier).await,
            None => Ok(Vec::new()),
        }
    }

    pub fn has_object_dispatcher(&self, kind: &str) -> bool {
        self.objects.contains_key(kind)
    }

    pub async fn dispatch_object(
        &self,
        kind: &str,
        ctx: RequestContext,
        values: BTreeMap<String, String>,
    ) -> Result<Option<Node>> {
        let Some(entry) = self.objects.get(kind).cloned() else {
            return Ok(None);
        };
        if let Some(authorize) = &entry.authorize {
            if !authorize(&values, ctx.authenticated_actor.as_deref()) {
                return Err(ApfedError::invalid_signature("not authorized for this object"));
            }
        }
        (entry.dispatch)(ctx, values).await
    }

    pub fn has_collection_dispatcher(&self, kind: &str) -> bool {
        self.collections.contains_key(kind)
    }

    pub async fn dispatch_collection(
        &self,
        kind: &str,
        ctx: RequestContext,
        identifier: String,
        cursor: Option<String>,
    ) -> Result<Option<CollectionDispatchResult>> {
        match self.collections.get(kind) {
            Some(dispatcher) => dispatcher(ctx, identifier, cursor).await,
            None => Ok(None),
        }
    }

    pub async fn dispatch_node_info(&self, ctx: RequestContext) -> Result<Option<NodeInfo>> {
        match &self.node_info {
            Some(dispatcher) => dispatcher(ctx).await.map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apfed_core::ClassTag;

    fn actor_dispatcher() -> ActorDispatcher {
        Arc::new(|_ctx, identifier| {
            Box::pin(async move {
                if identifier == "alice" {
                    Ok(Some(Node::new(vec![ClassTag::Person]).with_id("https://a.example/users/alice")))
                } else {
                    Ok(None)
                }
            })
        })
    }

    #[tokio::test]
    async fn dispatch_actor_returns_none_when_unregistered() {
        let table = DispatchTable::new();
        let result = table.dispatch_actor(RequestContext::new("https://a.example"), "alice".to_string()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn dispatch_actor_returns_none_on_a_null_result() {
        let mut table = DispatchTable::new();
        table.register_actor_dispatcher(actor_dispatcher()).unwrap();
        let result = table
            .dispatch_actor(RequestContext::new("https://a.example"), "ghost".to_string())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn dispatch_actor_resolves_a_known_identifier() {
        let mut table = DispatchTable::new();
        table.register_actor_dispatcher(actor_dispatcher()).unwrap();
        let result = table
            .dispatch_actor(RequestContext::new("https://a.example"), "alice".to_string())
            .await
            .unwrap();
        assert_eq!(result.unwrap().id.as_deref(), Some("https://a.example/users/alice"));
    }

    #[test]
    fn registering_a_second_actor_dispatcher_fails() {
        let mut table = DispatchTable::new();
        table.register_actor_dispatcher(actor_dispatcher()).unwrap();
        let err = table.register_actor_dispatcher(actor_dispatcher()).unwrap_err();
        assert_eq!(err.code(), apfed_error::ErrorCode::DuplicateRegistration);
    }

    #[test]
    fn registering_a_second_collection_dispatcher_of_the_same_kind_fails() {
        let mut table = DispatchTable::new();
        let dispatcher: CollectionDispatcherFn = Arc::new(|_ctx, _id, _cursor| Box::pin(async { Ok(None) }));
        table.register_collection_dispatcher("outbox", dispatcher.clone()).unwrap();
        let err = table.register_collection_dispatcher("outbox", dispatcher).unwrap_err();
        assert_eq!(err.code(), apfed_error::ErrorCode::DuplicateRegistration);
    }

    #[tokio::test]
    async fn collection_dispatch_distinguishes_container_from_page() {
        let mut table = DispatchTable::new();
        let dispatcher: CollectionDispatcherFn = Arc::new(|_ctx, _id, cursor| {
            Box::pin(async move {
                Ok(Some(match cursor {
                    None => CollectionDispatchResult::Container(CollectionContainer {
                        first: Some("c1".to_string()),
                        last: Some("c9".to_string()),
                        total_items: Some(2),
                    }),
                    Some(_) => CollectionDispatchResult::Page(CollectionPage {
                        items: vec![Node::new(vec![ClassTag::Person]).with_id("https://a.example/users/bob")],
                        prev_cursor: None,
                        next_cursor: None,
                    }),
                }))
            })
        });
        table.register_collection_dispatcher("followers", dispatcher).unwrap();

        let container = table
            .dispatch_collection("followers", RequestContext::new("https://a.example"), "alice".to_string(), None)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(container, CollectionDispatchResult::Container(_)));

        let page = table
            .dispatch_collection(
                "followers",
                RequestContext::new("https://a.example"),
                "alice".to_string(),
                Some("c1".to_string()),
            )
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(page, CollectionDispatchResult::Page(_)));
    }
}
