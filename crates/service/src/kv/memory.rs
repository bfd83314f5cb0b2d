use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{glob_match, Fields, HashStore, KvError};

/// In-process hash store. Values are kept exactly as written, so callers can
/// plant non-string values to simulate writers that bypass the story store.
#[derive(Clone, Default)]
pub struct MemoryHashStore {
    inner: Arc<RwLock<HashMap<String, Fields>>>,
}

impl MemoryHashStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl HashStore for MemoryHashStore {
    async fn hset(&self, key: &str, fields: &Fields) -> Result<(), KvError> {
        // an empty HSET is a no-op on the real store and must not create the key
        if fields.is_empty() {
            return Ok(());
        }
        let mut map = self.inner.write().await;
        let entry = map.entry(key.to_string()).or_default();
        for (k, v) in fields {
            entry.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<Option<Fields>, KvError> {
        let map = self.inner.read().await;
        Ok(map.get(key).cloned())
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        let map = self.inner.read().await;
        Ok(map.contains_key(key))
    }

    async fn del(&self, key: &str) -> Result<u64, KvError> {
        let mut map = self.inner.write().await;
        Ok(u64::from(map.remove(key).is_some()))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, KvError> {
        let map = self.inner.read().await;
        Ok(map.keys().filter(|k| glob_match(pattern, k)).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(pairs: &[(&str, serde_json::Value)]) -> Fields {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn memory_hash_store_basic_crud() -> Result<(), anyhow::Error> {
        let store = MemoryHashStore::new();
        assert!(store.is_empty().await);

        store.hset("story:1", &fields(&[("title", json!("a")), ("age", json!("5"))])).await?;
        // partial write merges into the existing hash
        store.hset("story:1", &fields(&[("title", json!("b"))])).await?;
        let got = store.hgetall("story:1").await?.expect("present");
        assert_eq!(got["title"], "b");
        assert_eq!(got["age"], "5");

        assert!(store.exists("story:1").await?);
        assert!(!store.exists("story:2").await?);

        store.hset("other:1", &fields(&[("x", json!("y"))])).await?;
        let keys = store.keys("story:*").await?;
        assert_eq!(keys, vec!["story:1".to_string()]);

        assert_eq!(store.del("story:1").await?, 1);
        assert_eq!(store.del("story:1").await?, 0);
        assert!(store.hgetall("story:1").await?.is_none());
        assert_eq!(store.len().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn empty_hset_does_not_create_key() -> Result<(), anyhow::Error> {
        let store = MemoryHashStore::new();
        store.hset("story:empty", &Fields::new()).await?;
        assert!(!store.exists("story:empty").await?);
        assert!(store.keys("story:*").await?.is_empty());
        assert!(store.is_empty().await);

        store.hset("story:1", &fields(&[("title", json!("a"))])).await?;
        store.hset("story:1", &Fields::new()).await?;
        assert_eq!(store.hgetall("story:1").await?.expect("present")["title"], "a");
        Ok(())
    }
}
