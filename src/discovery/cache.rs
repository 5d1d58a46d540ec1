//! Per-driver client cache
//!
//! Backend clients are built lazily, once per `(region-or-global, service)`
//! key, and reused for the lifetime of the driver instance. The cache is
//! owned by one driver and never shared; the lock serializes concurrent
//! runs on the same driver.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Region part of a cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientScope {
    Global,
    Region(String),
}

impl ClientScope {
    pub fn from_region(region: Option<&str>) -> Self {
        match region {
            Some(r) if !r.is_empty() => Self::Region(r.to_string()),
            _ => Self::Global,
        }
    }
}

impl fmt::Display for ClientScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Region(r) => write!(f, "{}", r),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub scope: ClientScope,
    pub service: String,
}

impl ClientKey {
    pub fn global(service: &str) -> Self {
        Self {
            scope: ClientScope::Global,
            service: service.to_string(),
        }
    }

    pub fn regional(region: &str, service: &str) -> Self {
        Self {
            scope: ClientScope::from_region(Some(region)),
            service: service.to_string(),
        }
    }
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

pub struct ClientCache<C> {
    entries: Mutex<HashMap<ClientKey, C>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<C> Default for ClientCache<C> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

impl<C: Clone> ClientCache<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached client for `key`, building it with `init` on a miss.
    /// A failed build caches nothing.
    pub async fn get_or_try_init<F, Fut, E>(&self, key: ClientKey, init: F) -> Result<C, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<C, E>>,
    {
        let mut entries = self.entries.lock().await;

        if let Some(client) = entries.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(client.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(scope = %key.scope, service = %key.service, "Building client");

        let client = init().await?;
        entries.insert(key, client.clone());
        Ok(client)
    }

    /// Drop every cached client
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_builds_once_per_key() {
        let cache: ClientCache<Arc<String>> = ClientCache::new();
        let builds = AtomicUsize::new(0);

        for _ in 0..3 {
            let client = cache
                .get_or_try_init(ClientKey::regional("r1", "compute"), || async {
                    builds.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, anyhow::Error>(Arc::new("compute@r1".to_string()))
                })
                .await
                .unwrap();
            assert_eq!(client.as_str(), "compute@r1");
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats(), CacheStats { hits: 2, misses: 1 });
    }

    #[tokio::test]
    async fn test_scope_and_service_are_both_part_of_key() {
        let cache: ClientCache<u32> = ClientCache::new();
        let keys = [
            ClientKey::global("compute"),
            ClientKey::regional("r1", "compute"),
            ClientKey::regional("r1", "storage"),
        ];
        for (i, key) in keys.iter().enumerate() {
            let v = cache
                .get_or_try_init(key.clone(), || async move { Ok::<_, ()>(i as u32) })
                .await
                .unwrap();
            assert_eq!(v, i as u32);
        }
        assert_eq!(cache.len().await, 3);
    }

    #[tokio::test]
    async fn test_failed_build_is_not_cached() {
        let cache: ClientCache<u32> = ClientCache::new();
        let key = ClientKey::global("sql");

        let first = cache
            .get_or_try_init(key.clone(), || async { Err::<u32, _>("denied") })
            .await;
        assert!(first.is_err());

        let second = cache
            .get_or_try_init(key, || async { Ok::<_, &str>(7) })
            .await;
        assert_eq!(second, Ok(7));
    }

    #[tokio::test]
    async fn test_clear_empties_cache() {
        let cache: ClientCache<u32> = ClientCache::new();
        cache
            .get_or_try_init(ClientKey::global("storage"), || async { Ok::<_, ()>(1) })
            .await
            .unwrap();
        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[test]
    fn test_empty_region_is_global() {
        assert_eq!(ClientScope::from_region(Some("")), ClientScope::Global);
        assert_eq!(ClientScope::from_region(None).to_string(), "global");
    }
}
