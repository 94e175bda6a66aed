//! HTTP Signatures (draft-cavage-12): signing outgoing requests, verifying
//! incoming ones, the key validity predicate, and a coalescing key-ownership
//! cache.

mod digest;
mod header;
mod key;
mod key_cache;
mod sign;
mod verify;

pub use digest::{compute_sha256_digest_header, verify_digest_header};
pub use header::SignatureHeader;
pub use key::{load_private_key, load_public_key, validate_public_key, MIN_MODULUS_BITS};
pub use key_cache::KeyCache;
pub use sign::sign_request;
pub use verify::{verify_request, KeyResolver};
