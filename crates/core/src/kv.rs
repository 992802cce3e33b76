//! Low-level key-value primitives backing the Session Store, Event Bus, and
//! TTS Cache: `setex`/`get`/`del`/`rpush`+`expire`/`blpop` behind a typed
//! async trait, so the higher-level stores stay testable without a live
//! Redis.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::Result;

/// String-keyed store with TTL support. One shared implementation backs
/// session storage, the event queue, and the TTS cache — each layer just
/// picks its own key prefix and TTL.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set_ex(&self, key: &str, value: String, ttl_seconds: u64) -> Result<()>;
    async fn del(&self, key: &str) -> Result<()>;
    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<()>;
    async fn rpush(&self, key: &str, value: String) -> Result<()>;
    /// Blocking pop with a timeout in whole seconds. `0` blocks forever,
    /// matching redis BLPOP semantics.
    async fn blpop(&self, key: &str, timeout_seconds: u64) -> Result<Option<String>>;
    /// Trim a list to the inclusive `[start, stop]` range (negative indices
    /// count from the end, as in Redis `LTRIM`). Used by the Tracing Store
    /// to cap `friendly:traces` at its last 1000 entries.
    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<()>;
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>>;
}

#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(RedisStore { conn })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: String, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_seconds).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.expire::<_, ()>(key, ttl_seconds as i64).await?;
        Ok(())
    }

    async fn rpush(&self, key: &str, value: String) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn blpop(&self, key: &str, timeout_seconds: u64) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let result: Option<(String, String)> = conn.blpop(key, timeout_seconds as f64).await?;
        Ok(result.map(|(_, value)| value))
    }

    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.ltrim::<_, ()>(key, start as isize, stop as isize).await?;
        Ok(())
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let values: Vec<String> = conn.lrange(key, start as isize, stop as isize).await?;
        Ok(values)
    }
}

/// In-memory stand-in for tests that don't want a live Redis. TTLs are
/// tracked but never actually expire entries — good enough for exercising
/// store/bus logic, not a cache simulator.
#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    #[derive(Default)]
    pub struct MockStore {
        strings: Mutex<std::collections::HashMap<String, String>>,
        lists: Mutex<std::collections::HashMap<String, VecDeque<String>>>,
    }

    impl MockStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl KeyValueStore for MockStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            Ok(self.strings.lock().await.get(key).cloned())
        }

        async fn set_ex(&self, key: &str, value: String, _ttl_seconds: u64) -> Result<()> {
            self.strings.lock().await.insert(key.to_string(), value);
            Ok(())
        }

        async fn del(&self, key: &str) -> Result<()> {
            self.strings.lock().await.remove(key);
            self.lists.lock().await.remove(key);
            Ok(())
        }

        async fn expire(&self, _key: &str, _ttl_seconds: u64) -> Result<()> {
            Ok(())
        }

        async fn rpush(&self, key: &str, value: String) -> Result<()> {
            self.lists.lock().await.entry(key.to_string()).or_default().push_back(value);
            Ok(())
        }

        async fn blpop(&self, key: &str, _timeout_seconds: u64) -> Result<Option<String>> {
            Ok(self.lists.lock().await.get_mut(key).and_then(|q| q.pop_front()))
        }

        async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<()> {
            let mut lists = self.lists.lock().await;
            if let Some(list) = lists.get_mut(key) {
                let len = list.len() as i64;
                let norm = |i: i64| -> usize {
                    if i < 0 {
                        (len + i).max(0) as usize
                    } else {
                        i.min(len) as usize
                    }
                };
                let (s, e) = (norm(start), norm(stop));
                let trimmed: VecDeque<String> = if s > e {
                    VecDeque::new()
                } else {
                    list.iter().skip(s).take(e - s + 1).cloned().collect()
                };
                *list = trimmed;
            }
            Ok(())
        }

        async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
            let mut lists = self.lists.lock().await;
            let list = lists.entry(key.to_string()).or_default();
            let len = list.len() as i64;
            let norm = |i: i64| -> usize {
                if i < 0 {
                    (len + i).max(0) as usize
                } else {
                    i.min(len.max(0)) as usize
                }
            };
            let (s, e) = (norm(start), norm(stop));
            if s > e {
                return Ok(Vec::new());
            }
            Ok(list.iter().skip(s).take(e - s + 1).cloned().collect())
        }
    }
}
