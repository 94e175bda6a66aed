use apfed_core::{ClassTag, Node, PropertySlot, PropertyValue};
use apfed_error::{ApfedError, Result};
use serde_json::{json, Map, Value};

const RESERVED_KEYS: &[&str] = &["@context", "@id", "id", "@type", "type"];

fn read_id(doc: &Map<String, Value>) -> Option<String> {
    doc.get("@id")
        .or_else(|| doc.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn read_types(doc: &Map<String, Value>) -> Vec<ClassTag> {
    let raw = doc.get("@type").or_else(|| doc.get("type"));
    match raw {
        Some(Value::String(s)) => ClassTag::from_str(s).into_iter().collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .filter_map(ClassTag::from_str)
            .collect(),
        _ => Vec::new(),
    }
}

fn parse_value(value: &Value) -> PropertyValue {
    match value {
        Value::Object(obj) => {
            // A reference has only an id/@id key (and possibly @type); an
            // inline object carries further properties and is parsed
            // recursively.
            let has_only_id = obj
                .keys()
                .all(|k| k == "@id" || k == "id" || k == "@type" || k == "type");
            if has_only_id {
                if let Some(id) = read_id(obj) {
                    return PropertyValue::Iri(id);
                }
            }
            match parse_node(obj) {
                Ok(node) => PropertyValue::Parsed(Box::new(node)),
                Err(_) => PropertyValue::Scalar(value.clone()),
            }
        }
        Value::String(s) if looks_like_iri(s) => PropertyValue::Iri(s.clone()),
        other => PropertyValue::Scalar(other.clone()),
    }
}

fn looks_like_iri(s: &str) -> bool {
    s.starts_with("https://") || s.starts_with("http://") || s.starts_with("urn:")
}

fn parse_node(doc: &Map<String, Value>) -> Result<Node> {
    let types = read_types(doc);
    let mut node = Node::new(types);
    node.id = read_id(doc);

    for (key, value) in doc {
        if RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        match value {
            Value::Array(items) => {
                let values: Vec<PropertyValue> = items.iter().map(parse_value).collect();
                node.set_multi(key.clone(), values);
            }
            other => {
                node.set(key.clone(), parse_value(other));
            }
        }
    }
    Ok(node)
}

/// Parses a JSON-LD document into a [`Node`], preserving bare IRIs instead
/// of eagerly fetching them.
pub fn from_json_ld(document: &Value) -> Result<Node> {
    let obj = document
        .as_object()
        .ok_or_else(|| ApfedError::malformed_input("JSON-LD document must be an object"))?;
    parse_node(obj)
}

/// Parses `document`, requiring its `@type` to be `expected` or one of its
/// descendants. Fails with `MalformedInput`-class `TypeMismatch` context
/// otherwise.
pub fn from_json_ld_as(document: &Value, expected: ClassTag) -> Result<Node> {
    let node = from_json_ld(document)?;
    let matches = node
        .types
        .iter()
        .any(|t| expected.is_ancestor_of(*t) || *t == expected);
    if !matches {
        return Err(ApfedError::malformed_input("type mismatch")
            .with_context("expected", expected.as_str())
            .with_context("actual", node.types.iter().map(|t| t.as_str()).collect::<Vec<_>>()));
    }
    Ok(node)
}

fn emit_value(value: &PropertyValue) -> Value {
    match value {
        PropertyValue::Scalar(v) => v.clone(),
        PropertyValue::Iri(iri) => Value::String(iri.clone()),
        PropertyValue::Parsed(node) => to_json_ld(node),
    }
}

/// Emits a [`Node`] as a JSON-LD document carrying the Activity Streams
/// context.
pub fn to_json_ld(node: &Node) -> Value {
    let mut doc = Map::new();
    doc.insert(
        "@context".to_string(),
        json!("https://www.w3.org/ns/activitystreams"),
    );
    if let Some(id) = &node.id {
        doc.insert("id".to_string(), json!(id));
    }
    if node.types.len() == 1 {
        doc.insert("type".to_string(), json!(node.types[0].as_str()));
    } else if !node.types.is_empty() {
        doc.insert(
            "type".to_string(),
            json!(node.types.iter().map(|t| t.as_str()).collect::<Vec<_>>()),
        );
    }
    for (key, slot) in &node.properties {
        let value = match slot {
            PropertySlot::Functional(v) => emit_value(v),
            PropertySlot::Multi(values) => Value::Array(values.iter().map(emit_value).collect()),
        };
        doc.insert(key.clone(), value);
    }
    Value::Object(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_mismatch_is_rejected() {
        let doc = json!({"@type": "Follow", "id": "https://a/1"});
        let err = from_json_ld_as(&doc, ClassTag::Person).unwrap_err();
        assert_eq!(err.code(), apfed_error::ErrorCode::MalformedInput);
    }

    #[test]
    fn type_mismatch_accepts_subclass() {
        let doc = json!({"@type": "Person", "id": "https://a/1"});
        assert!(from_json_ld_as(&doc, ClassTag::Actor).is_ok());
    }

    #[test]
    fn bare_iri_reference_is_kept_unfetched() {
        let doc = json!({
            "@type": "Follow",
            "id": "https://a/activities/1",
            "actor": "https://a/users/1",
            "object": "https://b/users/2",
        });
        let node = from_json_ld(&doc).unwrap();
        assert_eq!(
            node.get("object").unwrap().first().unwrap().id_only(),
            Some("https://b/users/2")
        );
    }
}
