use apfed_core::{ClassTag, Node, PropertySlot, PropertyValue};
use apfed_error::{ApfedError, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::jsonld::from_json_ld_as;

/// Fetches the JSON-LD document identified by an IRI. Implementations wrap
/// an HTTP client (with the federation settings' user-agent and timeout
/// applied) or, in tests, an in-memory fixture map.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, iri: &str) -> Result<Value>;
}

/// Materializes the value at `property` on `node`, trying each of
/// `candidates` in declaration order and succeeding on the first class that
/// parses without a type mismatch. Already-parsed values are returned from
/// cache without fetching.
pub async fn materialize(
    node: &mut Node,
    property: &str,
    candidates: &[ClassTag],
    loader: &dyn DocumentLoader,
) -> Result<Node> {
    let current = node
        .get(property)
        .and_then(PropertySlot::first)
        .cloned()
        .ok_or_else(|| ApfedError::not_found(format!("property not set: {property}")))?;

    if let PropertyValue::Parsed(parsed) = &current {
        return Ok((**parsed).clone());
    }

    let iri = current
        .id_only()
        .ok_or_else(|| ApfedError::malformed_input("property has no IRI to materialize"))?
        .to_string();

    let document = loader.load(&iri).await?;

    let mut last_err = None;
    for candidate in candidates {
        match from_json_ld_as(&document, *candidate) {
            Ok(parsed) => {
                node.set(property, PropertyValue::Parsed(Box::new(parsed.clone())));
                return Ok(parsed);
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err
        .unwrap_or_else(|| ApfedError::malformed_input("no candidate class matched"))
        .with_context("property", property)
        .with_context("iri", iri))
}
