//! Key-ownership cache: `(key-IRI → (public key, owner, fetched-at))` with
//! a bounded TTL and a per-key lock so concurrent verifications of the same
//! unresolved key coalesce into a single fetch.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;

use apfed_core::CryptographicKey;
use apfed_error::Result;

struct CacheEntry {
    key: CryptographicKey,
    fetched_at: Instant,
}

pub struct KeyCache {
    entries: DashMap<String, CacheEntry>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    ttl: Duration,
}

impl KeyCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            locks: DashMap::new(),
            ttl,
        }
    }

    /// Returns the cached key if fresh; otherwise runs `fetch` under a
    /// per-key lock (so concurrent callers for the same `key_id` share one
    /// fetch) and caches a positive result.
    pub async fn get_or_fetch<F, Fut>(&self, key_id: &str, fetch: F) -> Result<Option<CryptographicKey>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<CryptographicKey>>>,
    {
        if let Some(key) = self.fresh(key_id) {
            return Ok(Some(key));
        }

        let lock = self
            .locks
            .entry(key_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Some(key) = self.fresh(key_id) {
            return Ok(Some(key));
        }

        let fetched = fetch().await?;
        if let Some(key) = &fetched {
            self.entries.insert(
                key_id.to_string(),
                CacheEntry {
                    key: key.clone(),
                    fetched_at: Instant::now(),
                },
            );
        }
        Ok(fetched)
    }

    fn fresh(&self, key_id: &str) -> Option<CryptographicKey> {
        let entry = self.entries.get(key_id)?;
        if entry.fetched_at.elapsed() > self.ttl {
            None
        } else {
            Some(entry.key.clone())
        }
    }

    pub fn invalidate(&self, key_id: &str) {
        self.entries.remove(key_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn sample_key(id: &str) -> CryptographicKey {
        CryptographicKey {
            id: id.to_string(),
            public_key_pem: "pem".to_string(),
            owner: None,
        }
    }

    #[tokio::test]
    async fn concurrent_fetches_for_same_key_coalesce() {
        let cache = Arc::new(KeyCache::new(Duration::from_secs(60)));
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch("https://a/key", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Ok(Some(sample_key("https://a/key")))
                    })
                    .await
                    .unwrap()
            }));
        }
        for h in handles {
            assert!(h.await.unwrap().is_some());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entries_are_refetched() {
        let cache = KeyCache::new(Duration::from_millis(5));
        cache
            .get_or_fetch("k", || async { Ok(Some(sample_key("k"))) })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        cache
            .get_or_fetch("k", move || {
                calls2.fetch_add(1, Ordering::SeqCst);
                async move { Ok(Some(sample_key("k"))) }
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
