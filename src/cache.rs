// Object cache - serialized snapshots of users and posts, keyed by string
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Undecodable snapshot: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key/value cache holding JSON snapshots.
///
/// `get` returning `Ok(None)` is a miss. Any `Err` is a real failure and must
/// not be treated as a miss by callers.
#[async_trait]
pub trait ObjectCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Unconditional overwrite.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError>;

    async fn remove(&self, key: &str) -> Result<(), CacheError>;
}

pub type DynObjectCache = Arc<dyn ObjectCache>;

pub fn user_id_key(id: &str) -> String {
    format!("user:id:{}", id)
}

pub fn user_handle_key(handle: &str) -> String {
    format!("user:handle:{}", handle)
}

pub fn post_key(id: &str) -> String {
    format!("post:id:{}", id)
}

/// In-process cache. Entries never expire.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ObjectCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Memory cache whose `put` fails for keys starting with a chosen prefix.
    #[derive(Default)]
    pub(crate) struct FailingPuts {
        pub inner: MemoryCache,
        prefix: Mutex<Option<String>>,
    }

    impl FailingPuts {
        pub fn fail_puts_with(&self, prefix: &str) {
            *self.prefix.lock().unwrap() = Some(prefix.to_string());
        }
    }

    #[async_trait]
    impl ObjectCache for FailingPuts {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError> {
            let failing = match self.prefix.lock().unwrap().as_deref() {
                Some(prefix) => key.starts_with(prefix),
                None => false,
            };
            if failing {
                return Err(CacheError::Unavailable("write refused".into()));
            }
            self.inner.put(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), CacheError> {
            self.inner.remove(key).await
        }
    }

    #[tokio::test]
    async fn miss_is_none_not_error() {
        let cache = MemoryCache::new();
        assert!(cache.get("user:id:nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_overwrites() {
        let cache = MemoryCache::new();
        cache.put("k", b"one".to_vec()).await.unwrap();
        cache.put("k", b"two".to_vec()).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"two".to_vec()));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn remove_makes_key_miss() {
        let cache = MemoryCache::new();
        cache.put("k", b"v".to_vec()).await.unwrap();
        cache.remove("k").await.unwrap();
        cache.remove("k").await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(user_id_key("42"), "user:id:42");
        assert_eq!(user_handle_key("alice"), "user:handle:alice");
        assert_eq!(post_key("p1"), "post:id:p1");
    }

    #[tokio::test]
    async fn failing_puts_only_hit_matching_keys() {
        let cache = FailingPuts::default();
        cache.fail_puts_with("post:");
        assert!(cache.put("post:id:1", b"x".to_vec()).await.is_err());
        cache.put("user:id:1", b"y".to_vec()).await.unwrap();
        assert!(cache.get("post:id:1").await.unwrap().is_none());
    }
}
