//! The default set of named routes every federation handle registers.
//! Applications may register additional routes on the same [`Router`]
//! before it is frozen into a [`crate::Federation`].

use apfed_error::Result;
use apfed_router::Router;

pub const ROUTE_ACTOR: &str = "actor";
pub const ROUTE_INBOX: &str = "inbox";
pub const ROUTE_OUTBOX: &str = "outbox";
pub const ROUTE_SHARED_INBOX: &str = "sharedInbox";
pub const ROUTE_FOLLOWERS: &str = "followers";
pub const ROUTE_FOLLOWING: &str = "following";
pub const ROUTE_WEBFINGER: &str = "webfinger";
pub const ROUTE_NODEINFO_POINTER: &str = "nodeinfoPointer";
pub const ROUTE_NODEINFO: &str = "nodeinfo";

pub fn default_router() -> Result<Router> {
    let mut router = Router::new();
    router.add("/users/{identifier}", ROUTE_ACTOR)?;
    router.add("/users/{identifier}/inbox", ROUTE_INBOX)?;
    router.add("/users/{identifier}/outbox", ROUTE_OUTBOX)?;
    router.add("/users/{identifier}/followers", ROUTE_FOLLOWERS)?;
    router.add("/users/{identifier}/following", ROUTE_FOLLOWING)?;
    router.add("/inbox", ROUTE_SHARED_INBOX)?;
    router.add("/.well-known/webfinger", ROUTE_WEBFINGER)?;
    router.add("/.well-known/nodeinfo", ROUTE_NODEINFO_POINTER)?;
    router.add("/nodeinfo/2.1", ROUTE_NODEINFO)?;
    Ok(router)
}
