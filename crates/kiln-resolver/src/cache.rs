use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

/// A memoized, single-flight cache: `Mutex<HashMap<K, Arc<OnceCell<V>>>>`. The
/// cache lock is held only long enough to insert (or find) the per-key cell;
/// waiters block on the cell's own readiness outside the cache lock, which is
/// the single-flight idiom specified in §4.3/§9 — at most one initializer per
/// key runs, concurrent callers share its result.
pub struct SingleFlightCache<K, V> {
    entries: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> Default for SingleFlightCache<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        SingleFlightCache {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> SingleFlightCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the published value for `key` if present, without triggering work.
    pub async fn peek(&self, key: &K) -> Option<V> {
        let cell = {
            let guard = self.entries.lock().await;
            guard.get(key).cloned()
        }?;
        cell.get().cloned()
    }

    /// Returns the existing entry's value if already published or pending, or
    /// inserts a fresh pending entry and runs `init` to populate it. Exactly one
    /// concurrent caller per key runs `init`; the rest await its result.
    pub async fn get_or_init<F, Fut>(&self, key: K, init: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let cell = {
            let mut guard = self.entries.lock().await;
            guard.entry(key).or_insert_with(|| Arc::new(OnceCell::new())).clone()
        };
        cell.get_or_init(init).await.clone()
    }

    /// Snapshots the currently known keys, for the fuzzy-lookup pre-pass (§4.3):
    /// only keys with an already-published value are candidates.
    pub async fn published_keys(&self) -> Vec<K> {
        let guard = self.entries.lock().await;
        let mut keys = Vec::new();
        for (k, cell) in guard.iter() {
            if cell.initialized() {
                keys.push(k.clone());
            }
        }
        keys
    }

    /// Re-inserts `value` under `alias_key` as an immediately-ready, separate
    /// entry sharing the same value — used when a fuzzy hit is found under a
    /// different key than the one requested (§4.3: "re-inserted ... to reduce
    /// future drift").
    pub async fn alias(&self, alias_key: K, value: V) {
        let mut guard = self.entries.lock().await;
        guard
            .entry(alias_key)
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .set(value)
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn concurrent_callers_share_one_init() {
        let cache: Arc<SingleFlightCache<String, u32>> = Arc::new(SingleFlightCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_init("k".to_string(), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                        42
                    })
                    .await
            }));
        }

        for h in handles {
            assert_eq!(h.await.unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
