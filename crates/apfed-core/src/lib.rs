//! Core data model shared by the vocabulary runtime, the inbox and outbox
//! pipelines, and the federation engine: activities/objects, cryptographic
//! keys, recipients, and the class-tag hierarchy used for listener dispatch.

pub mod class;
pub mod node;

pub use class::ClassTag;
pub use node::{Node, PropertySlot, PropertyValue};

/// An IRI, kept as an owned `String` rather than `url::Url` since JSON-LD
/// identifiers are not always valid absolute URLs (e.g. `urn:uuid:…`).
pub type Iri = String;

/// A (IRI, public-key material, optional owner) tuple. Two keys are equal
/// when their IRIs match, independent of the key material.
#[derive(Debug, Clone)]
pub struct CryptographicKey {
    pub id: Iri,
    pub public_key_pem: String,
    pub owner: Option<Iri>,
}

impl PartialEq for CryptographicKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for CryptographicKey {}

/// A private key paired with the IRI of its public counterpart, used to
/// sign outgoing requests.
#[derive(Debug, Clone)]
pub struct SenderKeyPair {
    pub private_key_pem: String,
    pub public_key_id: Iri,
}

/// A resolved delivery target: an actor's IRI plus the inbox (and,
/// optionally, shared inbox) it should be delivered to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Recipient {
    pub actor_id: Iri,
    pub inbox: Iri,
    pub shared_inbox: Option<Iri>,
}

impl Recipient {
    pub fn new(actor_id: impl Into<Iri>, inbox: impl Into<Iri>) -> Self {
        Self {
            actor_id: actor_id.into(),
            inbox: inbox.into(),
            shared_inbox: None,
        }
    }

    pub fn with_shared_inbox(mut self, shared_inbox: impl Into<Iri>) -> Self {
        self.shared_inbox = Some(shared_inbox.into());
        self
    }

    /// The inbox actually used for delivery once shared-inbox coalescing is
    /// applied (§4.6 point 3).
    pub fn delivery_inbox(&self, prefer_shared_inbox: bool) -> &str {
        if prefer_shared_inbox {
            self.shared_inbox.as_deref().unwrap_or(&self.inbox)
        } else {
            &self.inbox
        }
    }
}
