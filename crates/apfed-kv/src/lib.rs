//! The key-value contract the inbox idempotency set and the key-ownership
//! cache depend on, plus an in-memory reference implementation suitable for
//! tests and single-process deployments.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use apfed_error::Result;

/// Keys are ordered sequences of one or more strings, joined with `\u{1f}`
/// (unit separator) internally so a real backend can use them as a flat
/// string key without ambiguity.
pub type Key = Vec<String>;
pub type Value = Vec<u8>;

fn flatten(key: &Key) -> String {
    key.join("\u{1f}")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    pub ttl: Option<Duration>,
}

impl SetOptions {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl: Some(ttl) }
    }
}

/// The contract the engine depends on: `get`, `set`, `delete`, plus
/// `set_if_absent` for idempotency inserts.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &Key) -> Result<Option<Value>>;
    async fn set(&self, key: &Key, value: Value, opts: SetOptions) -> Result<()>;
    async fn delete(&self, key: &Key) -> Result<()>;

    /// Atomically inserts `value` only if `key` is absent (or expired).
    /// Returns `true` if the insert happened, `false` if a live value was
    /// already present — the primitive the inbox dedup step uses.
    async fn set_if_absent(&self, key: &Key, value: Value, opts: SetOptions) -> Result<bool>;
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self) -> bool {
        match self.expires_at {
            Some(at) => Instant::now() < at,
            None => true,
        }
    }
}

/// An in-memory `KvStore`. Not durable across process restarts; intended as
/// the reference implementation and for tests, not as a mandated storage
/// engine.
#[derive(Default)]
pub struct InMemoryKv {
    entries: DashMap<String, Entry>,
}

impl InMemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn expiry(opts: SetOptions) -> Option<Instant> {
        opts.ttl.map(|ttl| {
            if ttl.is_zero() {
                Instant::now()
            } else {
                Instant::now() + ttl
            }
        })
    }
}

#[async_trait]
impl KvStore for InMemoryKv {
    async fn get(&self, key: &Key) -> Result<Option<Value>> {
        let flat = flatten(key);
        match self.entries.get(&flat) {
            Some(entry) if entry.is_live() => Ok(Some(entry.value.clone())),
            Some(_) => {
                self.entries.remove(&flat);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &Key, value: Value, opts: SetOptions) -> Result<()> {
        let flat = flatten(key);
        self.entries.insert(
            flat,
            Entry {
                value,
                expires_at: Self::expiry(opts),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &Key) -> Result<()> {
        self.entries.remove(&flatten(key));
        Ok(())
    }

    async fn set_if_absent(&self, key: &Key, value: Value, opts: SetOptions) -> Result<bool> {
        let flat = flatten(key);
        let expires_at = Self::expiry(opts);
        let mut inserted = false;
        self.entries
            .entry(flat)
            .and_modify(|existing| {
                if !existing.is_live() {
                    *existing = Entry {
                        value: value.clone(),
                        expires_at,
                    };
                    inserted = true;
                }
            })
            .or_insert_with(|| {
                inserted = true;
                Entry { value, expires_at }
            });
        Ok(inserted)
    }
}
