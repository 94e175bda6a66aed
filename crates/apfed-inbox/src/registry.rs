//! Listener registration and "most specific registered ancestor wins"
//! dispatch.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use apfed_core::{ClassTag, Node};
use apfed_error::{ApfedError, Result};

pub type ListenerFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
pub type Listener = Arc<dyn Fn(Node) -> ListenerFuture + Send + Sync>;

/// Listeners keyed by the most specific class they were registered for.
/// Exactly one listener may be registered per [`ClassTag`]; registering a
/// second is a [`ApfedError::duplicate_registration`].
#[derive(Default, Clone)]
pub struct ListenerRegistry {
    listeners: BTreeMap<ClassTag, Listener>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tag: ClassTag, listener: Listener) -> Result<()> {
        if self.listeners.contains_key(&tag) {
            return Err(ApfedError::duplicate_registration(format!(
                "listener already registered for {tag}"
            )));
        }
        self.listeners.insert(tag, listener);
        Ok(())
    }

    /// Walks `tag`'s ancestry, most specific first, returning the first
    /// registered listener found.
    pub fn dispatch(&self, tag: ClassTag) -> Option<(ClassTag, Listener)> {
        tag.ancestry()
            .into_iter()
            .find_map(|candidate| self.listeners.get(&candidate).map(|l| (candidate, l.clone())))
    }
}
