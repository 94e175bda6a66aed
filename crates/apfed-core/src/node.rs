//! In-memory representation of a parsed Activity Vocabulary object:
//! properties keep their declared cardinality (functional vs multi-valued)
//! and a property value may be a scalar, a bare IRI, or an already-parsed
//! inline object. Materializing an IRI into a parsed object is the
//! vocabulary runtime's job (`apfed-vocab`); this crate only stores the
//! tagged representation it resolves into.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::{ClassTag, Iri};

/// A single property value: a JSON scalar/array-of-scalars, a bare IRI
/// reference, or an object that has already been parsed (either because it
/// was inline in the source document, or because it was previously
/// materialized and memoized).
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Scalar(Value),
    Iri(Iri),
    Parsed(Box<Node>),
}

impl PropertyValue {
    /// The `idOnly` accessor: the IRI without triggering a fetch, whether
    /// the value is a bare reference or an already-parsed inline object.
    pub fn id_only(&self) -> Option<&str> {
        match self {
            PropertyValue::Scalar(_) => None,
            PropertyValue::Iri(iri) => Some(iri),
            PropertyValue::Parsed(node) => node.id.as_deref(),
        }
    }

    pub fn as_parsed(&self) -> Option<&Node> {
        match self {
            PropertyValue::Parsed(node) => Some(node),
            _ => None,
        }
    }

    pub fn is_materialized(&self) -> bool {
        matches!(self, PropertyValue::Parsed(_) | PropertyValue::Scalar(_))
    }
}

/// Cardinality-preserving storage for one property: either a single value
/// (functional property) or a list (multi-valued property).
#[derive(Debug, Clone, PartialEq)]
pub enum PropertySlot {
    Functional(PropertyValue),
    Multi(Vec<PropertyValue>),
}

impl PropertySlot {
    pub fn single(value: PropertyValue) -> Self {
        PropertySlot::Functional(value)
    }

    /// A singular-accessor read: the first value regardless of cardinality.
    pub fn first(&self) -> Option<&PropertyValue> {
        match self {
            PropertySlot::Functional(v) => Some(v),
            PropertySlot::Multi(values) => values.first(),
        }
    }

    /// A list-accessor read: every value regardless of cardinality.
    pub fn all(&self) -> Vec<&PropertyValue> {
        match self {
            PropertySlot::Functional(v) => vec![v],
            PropertySlot::Multi(values) => values.iter().collect(),
        }
    }
}

/// A parsed Activity or Object: an identifier, one or more class tags (a
/// document may legally declare more than one `@type`), and its properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: Option<Iri>,
    pub types: Vec<ClassTag>,
    pub properties: BTreeMap<String, PropertySlot>,
}

impl Node {
    pub fn new(types: Vec<ClassTag>) -> Self {
        Self {
            id: None,
            types,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<Iri>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: PropertyValue) {
        self.properties.insert(name.into(), PropertySlot::single(value));
    }

    pub fn set_multi(&mut self, name: impl Into<String>, values: Vec<PropertyValue>) {
        self.properties
            .insert(name.into(), PropertySlot::Multi(values));
    }

    pub fn get(&self, name: &str) -> Option<&PropertySlot> {
        self.properties.get(name)
    }

    /// The most specific declared type, used for listener dispatch.
    pub fn primary_type(&self) -> Option<ClassTag> {
        self.types.first().copied()
    }

    /// `clone(overrides)`: a shallow copy with named property overrides, as
    /// used by the outbox transformer chain.
    pub fn clone_with_overrides(&self, overrides: BTreeMap<String, PropertySlot>) -> Node {
        let mut next = self.clone();
        for (name, slot) in overrides {
            next.properties.insert(name, slot);
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_only_reads_through_parsed_values_without_fetching() {
        let mut inner = Node::new(vec![ClassTag::Person]).with_id("https://a/users/1");
        inner.set("name", PropertyValue::Scalar(Value::String("Alice".into())));
        let slot = PropertySlot::single(PropertyValue::Parsed(Box::new(inner)));
        assert_eq!(slot.first().unwrap().id_only(), Some("https://a/users/1"));
    }

    #[test]
    fn multi_valued_property_preserves_all_entries() {
        let mut node = Node::new(vec![ClassTag::Collection]);
        node.set_multi(
            "items",
            vec![
                PropertyValue::Iri("https://a/1".into()),
                PropertyValue::Iri("https://a/2".into()),
            ],
        );
        assert_eq!(node.get("items").unwrap().all().len(), 2);
    }

    #[test]
    fn clone_with_overrides_only_touches_named_properties() {
        let mut node = Node::new(vec![ClassTag::Follow]).with_id("https://a/activities/1");
        node.set("actor", PropertyValue::Iri("https://a/users/1".into()));
        node.set("object", PropertyValue::Iri("https://b/users/2".into()));

        let mut overrides = BTreeMap::new();
        overrides.insert(
            "actor".to_string(),
            PropertySlot::single(PropertyValue::Iri("https://a/users/1".into())),
        );
        let cloned = node.clone_with_overrides(overrides);
        assert_eq!(cloned.id, node.id);
        assert_eq!(
            cloned.get("object").unwrap().first().unwrap().id_only(),
            Some("https://b/users/2")
        );
    }
}
