//! Type-preserving JSON-LD ↔ [`Node`] serialization, plus lazy,
//! memoizing materialization of properties whose range includes non-scalar
//! types.

mod jsonld;
mod materialize;

pub use jsonld::{from_json_ld, from_json_ld_as, to_json_ld};
pub use materialize::{materialize, DocumentLoader};
