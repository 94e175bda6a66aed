//! Recipient expansion and shared-inbox coalescing (delivery design point 3):
//! turns the addressing fields of an outgoing activity into a deduplicated
//! list of actual HTTP deliveries.

use std::collections::HashSet;

use apfed_core::{ClassTag, Node, Recipient};
use apfed_error::{ApfedError, Result};
use apfed_vocab::DocumentLoader;
use async_trait::async_trait;

/// Expands the `"followers"` addressing token to the sender's followers, as
/// recipients. Implemented by the application (through its collection
/// dispatcher), since the outbox itself has no notion of a followers store.
#[async_trait]
pub trait FollowersResolver: Send + Sync {
    async fn followers(&self, sender_actor_id: &str) -> Result<Vec<Recipient>>;
}

/// One addressing target before expansion: an already-parsed actor, a bare
/// actor IRI to resolve, or the sender's followers collection (expanded
/// through a [`FollowersResolver`]).
pub enum RecipientTarget {
    Actor(Box<Node>),
    Iri(String),
    Followers,
}

/// Reads `inbox` and `endpoints.sharedInbox` off a parsed actor `Node`.
fn recipient_from_actor(actor: &Node) -> Result<Recipient> {
    let actor_id = actor
        .id
        .clone()
        .ok_or_else(|| ApfedError::malformed_input("actor has no id"))?;
    let inbox = actor
        .get("inbox")
        .and_then(|slot| slot.first())
        .and_then(|v| v.id_only())
        .ok_or_else(|| ApfedError::malformed_input("actor has no inbox").with_context("actor", actor_id.clone()))?
        .to_string();

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
    Ok(recipient)
}

/// Resolves every target to a `Recipient`, fetching bare IRIs as `Person`
/// actors (the common case; other actor types share the same properties).
/// `sender_actor_id` identifies the sender for `RecipientTarget::Followers`
/// expansion; `followers` is required whenever that target is present.
pub async fn expand_recipients(
    targets: Vec<RecipientTarget>,
    sender_actor_id: &str,
    loader: &dyn DocumentLoader,
    followers: Option<&dyn FollowersResolver>,
) -> Result<Vec<Recipient>> {
    let mut recipients = Vec::with_capacity(targets.len());
    for target in targets {
        match target {
            RecipientTarget::Actor(actor) => recipients.push(recipient_from_actor(&actor)?),
            RecipientTarget::Iri(iri) => {
                let document = loader.load(&iri).await?;
                let actor = apfed_vocab::from_json_ld_as(&document, ClassTag::Actor)?;
                recipients.push(recipient_from_actor(&actor)?);
            }
            RecipientTarget::Followers => {
                let resolver = followers.ok_or_else(|| {
                    ApfedError::malformed_input("\"followers\" addressing requires a followers resolver")
                })?;
                recipients.extend(resolver.followers(sender_actor_id).await?);
            }
        }
    }
    Ok(recipients)
}

/// Coalesces recipients sharing a delivery inbox (after applying shared-inbox
/// preference) into a single entry, and drops exact duplicates. Order of
/// first appearance is preserved.
pub fn coalesce(recipients: Vec<Recipient>, prefer_shared_inbox: bool) -> Vec<Recipient> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for recipient in recipients {
        let key = recipient.delivery_inbox(prefer_shared_inbox).to_string();
        if seen.insert(key) {
            out.push(recipient);
        }
    }
    out
}
