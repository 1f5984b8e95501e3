use crate::config::{StorageBackend, StorageConfig};
use crate::domain::ports::KeyValueStore;
#[cfg(not(feature = "redis-store"))]
use crate::utils::error::GuardianError;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// 行程內的 key-value 儲存，重啟後資料消失
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<BTreeMap<String, serde_json::Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set_json(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(feature = "redis-store")]
pub use self::redis_store::RedisStore;

#[cfg(feature = "redis-store")]
mod redis_store {
    use super::*;
    use redis::aio::MultiplexedConnection;
    use redis::AsyncCommands;

    /// Redis 版本，所有 key 加上 `{namespace}:` 前綴
    #[derive(Clone)]
    pub struct RedisStore {
        connection: MultiplexedConnection,
        namespace: String,
    }

    impl RedisStore {
        pub async fn connect(url: &str, namespace: &str) -> Result<Self> {
            let client = redis::Client::open(url)?;
            let connection = client.get_multiplexed_async_connection().await?;
            tracing::info!("🔌 Connected to Redis at {}", url);
            Ok(Self {
                connection,
                namespace: namespace.to_string(),
            })
        }

        fn full_key(&self, key: &str) -> String {
            format!("{}:{}", self.namespace, key)
        }
    }

    #[async_trait]
    impl KeyValueStore for RedisStore {
        async fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>> {
            let mut conn = self.connection.clone();
            let raw: Option<String> = conn.get(self.full_key(key)).await?;
            match raw {
                Some(text) => Ok(Some(serde_json::from_str(&text)?)),
                None => Ok(None),
            }
        }

        async fn set_json(&self, key: &str, value: serde_json::Value) -> Result<()> {
            let mut conn = self.connection.clone();
            let payload = serde_json::to_string(&value)?;
            let _: () = conn.set(self.full_key(key), payload).await?;
            Ok(())
        }

        async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
            let mut conn = self.connection.clone();
            let pattern = format!("{}*", self.full_key(prefix));
            let raw: Vec<String> = conn.keys(pattern).await?;

            let strip = format!("{}:", self.namespace);
            let mut keys: Vec<String> = raw
                .into_iter()
                .filter_map(|k| k.strip_prefix(&strip).map(str::to_string))
                .collect();
            keys.sort();
            Ok(keys)
        }

        async fn ping(&self) -> Result<()> {
            let mut conn = self.connection.clone();
            let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(())
        }

        fn backend_name(&self) -> &'static str {
            "redis"
        }
    }
}

/// 依設定建立儲存後端
pub async fn build_store(config: &StorageConfig) -> Result<Arc<dyn KeyValueStore>> {
    match config.backend {
        StorageBackend::Memory => {
            tracing::info!("🗂️ Using in-memory storage");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "redis-store")]
        StorageBackend::Redis => {
            let store = RedisStore::connect(&config.redis_url, &config.key_prefix).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis-store"))]
        StorageBackend::Redis => Err(GuardianError::ConfigError {
            message: "storage.backend = \"redis\" requires the redis-store feature".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_store_set_get_overwrite() {
        let store = MemoryStore::new();
        assert!(store.is_empty().await);

        store.set_json("agent:planner-001", json!({"status": "active"})).await.unwrap();
        let value = store.get_json("agent:planner-001").await.unwrap().unwrap();
        assert_eq!(value["status"], "active");

        store.set_json("agent:planner-001", json!({"status": "working"})).await.unwrap();
        let value = store.get_json("agent:planner-001").await.unwrap().unwrap();
        assert_eq!(value["status"], "working");
        assert_eq!(store.len().await, 1);
        assert!(store.get_json("agent:missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_keys_by_prefix() {
        let store = MemoryStore::new();
        store.set_json("plan:b", json!(2)).await.unwrap();
        store.set_json("plan:a", json!(1)).await.unwrap();
        store.set_json("planner", json!(0)).await.unwrap();
        store.set_json("execution:x", json!(3)).await.unwrap();

        let keys = store.keys("plan:").await.unwrap();
        assert_eq!(keys, vec!["plan:a".to_string(), "plan:b".to_string()]);
        assert_eq!(store.len().await, 4);
    }

    #[tokio::test]
    async fn test_build_memory_store() {
        let store = build_store(&StorageConfig::default()).await.unwrap();
        assert_eq!(store.backend_name(), "memory");
        store.ping().await.unwrap();
    }
}
