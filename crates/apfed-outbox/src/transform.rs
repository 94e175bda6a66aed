//! The transformer chain applied to every outgoing activity before
//! recipient expansion: a pure, ordered sequence of `activity -> activity`
//! steps given a sending context.

use apfed_core::{Node, PropertySlot, PropertyValue};
use apfed_error::Result;
use uuid::Uuid;

/// A pure transformation applied to an outgoing activity.
pub trait Transformer: Send + Sync {
    fn apply(&self, activity: &mut Node) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Assigns `urn:uuid:…` to `activity.id` if unset, logging a warning — the
/// invariant that every outbound activity has a non-null id.
pub struct AutoId;

impl Transformer for AutoId {
    fn apply(&self, activity: &mut Node) -> Result<()> {
        if activity.id.is_none() {
            let id = format!("urn:uuid:{}", Uuid::new_v4());
            tracing::warn!(target: "apfed.outbox", activity_id = %id, "assigning missing activity id");
            activity.id = Some(id);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "auto-id"
    }
}

/// Replaces inline actor objects under `actor` with their bare IRI, working
/// around receivers that reject inline actors.
pub struct ActorDehydrator;

impl Transformer for ActorDehydrator {
    fn apply(&self, activity: &mut Node) -> Result<()> {
        if let Some(slot) = activity.properties.get("actor").cloned() {
            let dehydrated = match slot {
                PropertySlot::Functional(value) => {
                    PropertySlot::Functional(dehydrate_value(value))
                }
                PropertySlot::Multi(values) => {
                    PropertySlot::Multi(values.into_iter().map(dehydrate_value).collect())
                }
            };
            activity.properties.insert("actor".to_string(), dehydrated);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "actor-dehydrator"
    }
}

fn dehydrate_value(value: PropertyValue) -> PropertyValue {
    match value.id_only() {
        Some(iri) => PropertyValue::Iri(iri.to_string()),
        None => value,
    }
}

/// The default chain: auto-id, then actor dehydration. Application-supplied
/// transformers run after these, in registration order.
pub fn default_chain() -> Vec<Box<dyn Transformer>> {
    vec![Box::new(AutoId), Box::new(ActorDehydrator)]
}

pub fn apply_chain(activity: &mut Node, chain: &[Box<dyn Transformer>]) -> Result<()> {
    for transformer in chain {
        transformer.apply(activity)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use apfed_core::ClassTag;

    #[test]
    fn auto_id_assigns_urn_uuid_when_missing() {
        let mut activity = Node::new(vec![ClassTag::Follow]);
        AutoId.apply(&mut activity).unwrap();
        assert!(activity.id.as_deref().unwrap().starts_with("urn:uuid:"));
    }

    #[test]
    fn auto_id_leaves_existing_id_untouched() {
        let mut activity = Node::new(vec![ClassTag::Follow]).with_id("https://a/activities/1");
        AutoId.apply(&mut activity).unwrap();
        assert_eq!(activity.id.as_deref(), Some("https://a/activities/1"));
    }

    #[test]
    fn actor_dehydrator_replaces_inline_actor_with_iri() {
        let mut inner = Node::new(vec![ClassTag::Person]).with_id("https://a/users/1");
        inner.set("name", PropertyValue::Scalar(serde_json::json!("Alice")));
        let mut activity = Node::new(vec![ClassTag::Follow]).with_id("https://a/activities/1");
        activity.set("actor", PropertyValue::Parsed(Box::new(inner)));

        ActorDehydrator.apply(&mut activity).unwrap();
        let value = activity.get("actor").unwrap().first().unwrap();
        assert!(matches!(value, PropertyValue::Iri(iri) if iri == "https://a/users/1"));
    }

    #[test]
    fn default_chain_runs_auto_id_then_dehydrator() {
        let mut inner = Node::new(vec![ClassTag::Person]).with_id("https://a/users/1");
        let mut activity = Node::new(vec![ClassTag::Follow]);
        activity.set("actor", PropertyValue::Parsed(Box::new(inner.clone())));
        inner.id = None;

        apply_chain(&mut activity, &default_chain()).unwrap();
        assert!(activity.id.is_some());
        assert!(matches!(
            activity.get("actor").unwrap().first().unwrap(),
            PropertyValue::Iri(_)
        ));
    }
}
