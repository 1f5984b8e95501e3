use crate::domain::ports::KeyValueStore;
use crate::utils::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub fn agent_key(id: &str) -> String {
    format!("agent:{}", id)
}

pub fn plan_key(id: &str) -> String {
    format!("plan:{}", id)
}

pub fn execution_key(id: &str) -> String {
    format!("execution:{}", id)
}

pub fn approval_key(id: &str) -> String {
    format!("approval:{}", id)
}

pub fn audit_key(id: &str) -> String {
    format!("audit:{}", id)
}

pub async fn save<T: Serialize + Sync>(store: &dyn KeyValueStore, key: &str, record: &T) -> Result<()> {
    let value = serde_json::to_value(record)?;
    store.set_json(key, value).await
}

pub async fn load<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match store.get_json(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// 讀取前綴下所有紀錄，無法解析的紀錄記錄警告後略過
pub async fn load_all<T: DeserializeOwned>(store: &dyn KeyValueStore, prefix: &str) -> Result<Vec<T>> {
    let mut records = Vec::new();
    for key in store.keys(prefix).await? {
        let Some(value) = store.get_json(&key).await? else {
            continue;
        };
        match serde_json::from_value(value) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!("⚠️ Skipping unreadable record {}: {}", key, e),
        }
    }
    Ok(records)
}
