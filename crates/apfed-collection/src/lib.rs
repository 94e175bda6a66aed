//! Cursor-based collection paging types and the FEP-8fcf
//! `Collection-Synchronization` digest.

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};

pub type Cursor = String;

/// The page of items a collection dispatcher returns for a given cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionPage<T> {
    pub items: Vec<T>,
    pub prev_cursor: Option<Cursor>,
    pub next_cursor: Option<Cursor>,
}

/// The container page served when no `?cursor=` is supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionContainer {
    pub first: Option<Cursor>,
    pub last: Option<Cursor>,
    pub total_items: Option<u64>,
}

/// The XOR-fold of SHA-256 hashes over each distinct item IRI, hex-encoded.
/// Order- and duplicate-insensitive by construction.
pub fn collection_digest<'a, I>(uris: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let distinct: BTreeSet<&str> = uris.into_iter().collect();
    let mut folded = [0u8; 32];
    for uri in distinct {
        let hash = Sha256::digest(uri.as_bytes());
        for (acc, byte) in folded.iter_mut().zip(hash.iter()) {
            *acc ^= byte;
        }
    }
    hex::encode(folded)
}

/// Builds the `Collection-Synchronization` header value for `collection_id`,
/// a peer-supplied `base_url`, and the set of item URIs.
pub fn synchronization_header<'a, I>(collection_id: &str, base_url: &str, uris: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let digest = collection_digest(uris);
    let encoded_base = urlencoding::encode(base_url);
    format!(
        r#"collectionId="{collection_id}", url="{collection_id}?base-url={encoded_base}", digest="{digest}""#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const VECTOR: &[&str] = &[
        "https://testing.example.org/users/1",
        "https://testing.example.org/users/2",
        "https://testing.example.org/users/2",
    ];
    const EXPECTED_DIGEST: &str =
        "c33f48cd341ef046a206b8a72ec97af65079f9a3a9b90eef79c5920dce45c61f";

    #[test]
    fn scenario_a_collection_digest_vector() {
        assert_eq!(collection_digest(VECTOR.iter().copied()), EXPECTED_DIGEST);
    }

    #[test]
    fn digest_is_order_insensitive() {
        let forward = collection_digest(VECTOR.iter().copied());
        let reversed: Vec<&str> = VECTOR.iter().rev().copied().collect();
        assert_eq!(collection_digest(reversed), forward);
    }

    #[test]
    fn digest_is_duplicate_insensitive() {
        let with_dup = collection_digest(VECTOR.iter().copied());
        let without_dup = collection_digest(
            ["https://testing.example.org/users/1", "https://testing.example.org/users/2"],
        );
        assert_eq!(with_dup, without_dup);
    }

    #[test]
    fn scenario_b_sync_header_literal() {
        let header = synchronization_header(
            "https://testing.example.org/users/1/followers",
            "https://testing.example.org/",
            VECTOR.iter().copied(),
        );
        assert_eq!(
            header,
            format!(
                r#"collectionId="https://testing.example.org/users/1/followers", url="https://testing.example.org/users/1/followers?base-url=https%3A%2F%2Ftesting.example.org%2F", digest="{EXPECTED_DIGEST}""#
            )
        );
    }
}
