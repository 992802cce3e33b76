//! Per-session event queue backing the SSE Gateway: a Redis list per
//! session, `RPUSH` + `EXPIRE` on publish, blocking `BLPOP` on consume.
//! This is what lets multiple worker processes share one session's event
//! stream — the agent task that advances a session and the HTTP handler
//! that streams its events don't need to run in the same process.

use std::sync::Arc;

use crate::domain::Event;
use crate::error::Result;
use crate::kv::KeyValueStore;

const QUEUE_TTL_SECONDS: u64 = 3600;

#[derive(Clone)]
pub struct EventBus {
    kv: Arc<dyn KeyValueStore>,
}

impl EventBus {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        EventBus { kv }
    }

    pub async fn push(&self, session_id: &str, event: &Event) -> Result<()> {
        let key = events_key(session_id);
        let encoded = serde_json::to_string(event)?;
        self.kv.rpush(&key, encoded).await?;
        self.kv.expire(&key, QUEUE_TTL_SECONDS).await
    }

    /// Blocking pop with a timeout. Returns `None` on timeout so the SSE
    /// Gateway can emit a keepalive and loop rather than holding the
    /// connection open on a dead blocking call forever.
    pub async fn pop(&self, session_id: &str, timeout_seconds: u64) -> Result<Option<Event>> {
        let key = events_key(session_id);
        match self.kv.blpop(&key, timeout_seconds).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn clear(&self, session_id: &str) -> Result<()> {
        self.kv.del(&events_key(session_id)).await
    }
}

fn events_key(session_id: &str) -> String {
    format!("events:{session_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::mock::MockStore;

    #[tokio::test]
    async fn push_then_pop_preserves_order() {
        let bus = EventBus::new(Arc::new(MockStore::new()));
        bus.push("s1", &Event::new("queue_ringing".into(), serde_json::json!({}))).await.unwrap();
        bus.push("s1", &Event::new("queue_ivr".into(), serde_json::json!({}))).await.unwrap();

        let first = bus.pop("s1", 1).await.unwrap().unwrap();
        let second = bus.pop("s1", 1).await.unwrap().unwrap();
        assert_eq!(first.event_type, "queue_ringing");
        assert_eq!(second.event_type, "queue_ivr");
    }

    #[tokio::test]
    async fn pop_on_empty_queue_returns_none() {
        let bus = EventBus::new(Arc::new(MockStore::new()));
        assert!(bus.pop("empty", 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_drops_pending_events() {
        let bus = EventBus::new(Arc::new(MockStore::new()));
        bus.push("s1", &Event::new("x".into(), serde_json::json!({}))).await.unwrap();
        bus.clear("s1").await.unwrap();
        assert!(bus.pop("s1", 1).await.unwrap().is_none());
    }
}
