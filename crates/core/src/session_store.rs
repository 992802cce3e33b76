//! Typed session persistence over the [`KeyValueStore`]: `save`/`load`/`delete`
//! for any serde-serializable session type, keyed per agent kind so Blitz,
//! Queue, CallFriend, Build, and Inbox sessions don't collide.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::kv::KeyValueStore;

const DEFAULT_TTL_SECONDS: u64 = 3600;
const QUEUE_TTL_SECONDS: u64 = 7200;

#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        SessionStore { kv }
    }

    pub async fn save<T: Serialize + Sync>(&self, prefix: &str, id: &str, value: &T) -> Result<()> {
        let ttl = ttl_for_prefix(prefix);
        let key = session_key(prefix, id);
        let encoded = serde_json::to_string(value)?;
        self.kv.set_ex(&key, encoded, ttl).await
    }

    pub async fn load<T: DeserializeOwned>(&self, prefix: &str, id: &str) -> Result<Option<T>> {
        let key = session_key(prefix, id);
        match self.kv.get(&key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn delete(&self, prefix: &str, id: &str) -> Result<()> {
        self.kv.del(&session_key(prefix, id)).await
    }
}

fn session_key(prefix: &str, id: &str) -> String {
    format!("{prefix}:{id}")
}

/// Queue sessions live longer than the rest — a caller waiting on hold for
/// HMRC can reasonably sit there for over an hour.
fn ttl_for_prefix(prefix: &str) -> u64 {
    if prefix == "queue" {
        QUEUE_TTL_SECONDS
    } else {
        DEFAULT_TTL_SECONDS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::mock::MockStore;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Dummy {
        id: String,
        count: u32,
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let store = SessionStore::new(Arc::new(MockStore::new()));
        let value = Dummy { id: "abc".into(), count: 3 };
        store.save("session", "abc", &value).await.unwrap();

        let loaded: Option<Dummy> = store.load("session", "abc").await.unwrap();
        assert_eq!(loaded, Some(value));
    }

    #[tokio::test]
    async fn missing_key_loads_none() {
        let store = SessionStore::new(Arc::new(MockStore::new()));
        let loaded: Option<Dummy> = store.load("session", "missing").await.unwrap();
        assert_eq!(loaded, None);
    }

    #[tokio::test]
    async fn delete_removes_value() {
        let store = SessionStore::new(Arc::new(MockStore::new()));
        let value = Dummy { id: "abc".into(), count: 1 };
        store.save("queue", "abc", &value).await.unwrap();
        store.delete("queue", "abc").await.unwrap();

        let loaded: Option<Dummy> = store.load("queue", "abc").await.unwrap();
        assert_eq!(loaded, None);
    }
}
