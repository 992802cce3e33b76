//! Tracing Store: a bounded in-memory ring of structured operation outcomes,
//! with cached aggregations. Three read shapes sit on top of the ring —
//! `get_performance_summary`, `get_improvement_data`, `get_recent_traces` —
//! and every write is fire-and-forget: a logging failure here must never
//! crash the app it's instrumenting.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::kv::KeyValueStore;

const RING_CAPACITY: usize = 500;
const PERSIST_TRIM: i64 = 1000;
const PERSIST_KEY: &str = "friendly:traces";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    pub operation: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub duration_s: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TraceRecord {
    pub fn new(operation: impl Into<String>, success: bool, duration_s: f64) -> Self {
        TraceRecord {
            operation: operation.into(),
            timestamp: Utc::now(),
            success,
            duration_s,
            input: None,
            output: None,
            metadata: Value::Object(Default::default()),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OperationStats {
    pub operation: String,
    pub count: usize,
    pub success_count: usize,
    pub success_rate: f64,
    pub avg_duration_s: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BlitzInsights {
    pub total_calls: usize,
    pub response_rate: f64,
    pub quote_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PerformanceSummary {
    pub total_traces: usize,
    pub by_operation: Vec<OperationStats>,
    pub blitz_insights: BlitzInsights,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ImprovementBucket {
    pub bucket_start: DateTime<Utc>,
    pub count: usize,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ImprovementData {
    pub buckets: Vec<ImprovementBucket>,
}

/// Process-wide ring buffer. Tracing is fire-and-forget by contract: a
/// caller only ever calls [`Self::record`], never awaits persistence, and
/// nothing downstream can make `record` fail.
pub struct TracingStore {
    ring: RwLock<VecDeque<TraceRecord>>,
    summary_cache: RwLock<Option<PerformanceSummary>>,
}

impl TracingStore {
    pub fn new() -> Self {
        TracingStore {
            ring: RwLock::new(VecDeque::with_capacity(RING_CAPACITY)),
            summary_cache: RwLock::new(None),
        }
    }

    /// Record a trace outcome. Never blocks on I/O; invalidates the cached
    /// summary so the next read recomputes it.
    pub fn record(&self, record: TraceRecord) {
        let mut ring = self.ring.write();
        if ring.len() >= RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(record);
        *self.summary_cache.write() = None;
    }

    /// Record and, fire-and-forget, persist to the KV service. Any failure
    /// in the spawned persistence task is logged and swallowed — it must
    /// never propagate back to the caller.
    pub fn record_and_persist(self: &Arc<Self>, record: TraceRecord, kv: Arc<dyn KeyValueStore>) {
        self.record(record.clone());
        let store = self.clone();
        tokio::spawn(async move {
            if let Err(err) = store.persist_one(&record, kv.as_ref()).await {
                tracing::debug!(error = %err, "tracing store persistence failed, dropping trace");
            }
        });
    }

    async fn persist_one(&self, record: &TraceRecord, kv: &dyn KeyValueStore) -> crate::error::Result<()> {
        let encoded = serde_json::to_string(record)?;
        kv.rpush(PERSIST_KEY, encoded).await?;
        kv.ltrim(PERSIST_KEY, -PERSIST_TRIM, -1).await?;
        Ok(())
    }

    /// Rehydrate the ring from the KV service at boot, oldest-first.
    pub async fn hydrate(&self, kv: &dyn KeyValueStore) {
        let raw = match kv.lrange(PERSIST_KEY, -(RING_CAPACITY as i64), -1).await {
            Ok(values) => values,
            Err(err) => {
                tracing::debug!(error = %err, "tracing store hydration failed, starting empty");
                return;
            }
        };
        let mut ring = self.ring.write();
        for line in raw {
            if let Ok(record) = serde_json::from_str::<TraceRecord>(&line) {
                ring.push_back(record);
            }
        }
        *self.summary_cache.write() = None;
    }

    pub fn recent_traces(&self, operation: Option<&str>, limit: usize) -> Vec<TraceRecord> {
        let ring = self.ring.read();
        ring.iter()
            .rev()
            .filter(|r| operation.map(|op| r.operation == op).unwrap_or(true))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn performance_summary(&self) -> PerformanceSummary {
        if let Some(cached) = self.summary_cache.read().as_ref() {
            return cached.clone();
        }
        let computed = self.compute_summary();
        *self.summary_cache.write() = Some(computed.clone());
        computed
    }

    fn compute_summary(&self) -> PerformanceSummary {
        let ring = self.ring.read();
        let mut by_operation: Vec<OperationStats> = Vec::new();

        let mut operations: Vec<&str> = ring.iter().map(|r| r.operation.as_str()).collect();
        operations.sort_unstable();
        operations.dedup();

        for op in operations {
            let matching: Vec<&TraceRecord> = ring.iter().filter(|r| r.operation == op).collect();
            let count = matching.len();
            let success_count = matching.iter().filter(|r| r.success).count();
            let avg_duration = if count > 0 {
                matching.iter().map(|r| r.duration_s).sum::<f64>() / count as f64
            } else {
                0.0
            };
            by_operation.push(OperationStats {
                operation: op.to_string(),
                count,
                success_count,
                success_rate: if count > 0 { success_count as f64 / count as f64 } else { 0.0 },
                avg_duration_s: avg_duration,
            });
        }

        let blitz_calls: Vec<&TraceRecord> = ring.iter().filter(|r| r.operation == "blitz_call").collect();
        let blitz_insights = if blitz_calls.is_empty() {
            BlitzInsights::default()
        } else {
            let total = blitz_calls.len();
            let responded = blitz_calls
                .iter()
                .filter(|r| r.metadata.get("business_responded").and_then(Value::as_bool).unwrap_or(false))
                .count();
            let quoted = blitz_calls
                .iter()
                .filter(|r| r.metadata.get("quote_received").map(|v| !v.is_null()).unwrap_or(false))
                .count();
            BlitzInsights {
                total_calls: total,
                response_rate: responded as f64 / total as f64,
                quote_rate: quoted as f64 / total as f64,
            }
        };

        PerformanceSummary {
            total_traces: ring.len(),
            by_operation,
            blitz_insights,
        }
    }

    /// Success rate progression over time, bucketed into up to 10 equal
    /// time-ordered chunks of the ring — the "self-improving workflow"
    /// signal the dashboard plots.
    pub fn improvement_data(&self) -> ImprovementData {
        const MAX_BUCKETS: usize = 10;
        let ring = self.ring.read();
        if ring.is_empty() {
            return ImprovementData::default();
        }

        let bucket_size = (ring.len() / MAX_BUCKETS).max(1);
        let mut buckets = Vec::new();
        let items: Vec<&TraceRecord> = ring.iter().collect();

        for chunk in items.chunks(bucket_size) {
            let count = chunk.len();
            let success_count = chunk.iter().filter(|r| r.success).count();
            buckets.push(ImprovementBucket {
                bucket_start: chunk[0].timestamp,
                count,
                success_rate: if count > 0 { success_count as f64 / count as f64 } else { 0.0 },
            });
        }

        ImprovementData { buckets }
    }
}

impl Default for TracingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::mock::MockStore;

    #[test]
    fn ring_evicts_oldest_past_capacity() {
        let store = TracingStore::new();
        for i in 0..(RING_CAPACITY + 10) {
            store.record(TraceRecord::new("op", true, 0.1 * i as f64));
        }
        assert_eq!(store.recent_traces(None, RING_CAPACITY + 10).len(), RING_CAPACITY);
    }

    #[test]
    fn performance_summary_computes_success_rate() {
        let store = TracingStore::new();
        store.record(TraceRecord::new("classify_intent", true, 0.2));
        store.record(TraceRecord::new("classify_intent", false, 0.3).with_error("timeout"));

        let summary = store.performance_summary();
        let stats = summary.by_operation.iter().find(|s| s.operation == "classify_intent").unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.success_rate, 0.5);
    }

    #[test]
    fn blitz_insights_track_response_and_quote_rate() {
        let store = TracingStore::new();
        store.record(
            TraceRecord::new("blitz_call", true, 10.0)
                .with_metadata(serde_json::json!({"business_responded": true, "quote_received": 95.0})),
        );
        store.record(
            TraceRecord::new("blitz_call", true, 8.0)
                .with_metadata(serde_json::json!({"business_responded": false, "quote_received": null})),
        );

        let summary = store.performance_summary();
        assert_eq!(summary.blitz_insights.total_calls, 2);
        assert_eq!(summary.blitz_insights.response_rate, 0.5);
        assert_eq!(summary.blitz_insights.quote_rate, 0.5);
    }

    #[test]
    fn record_invalidates_cached_summary() {
        let store = TracingStore::new();
        store.record(TraceRecord::new("op", true, 0.1));
        let first = store.performance_summary();
        assert_eq!(first.total_traces, 1);

        store.record(TraceRecord::new("op", true, 0.1));
        let second = store.performance_summary();
        assert_eq!(second.total_traces, 2);
    }

    #[tokio::test]
    async fn hydrate_reloads_persisted_traces() {
        let kv = MockStore::new();
        kv.rpush("friendly:traces", serde_json::to_string(&TraceRecord::new("op", true, 1.0)).unwrap())
            .await
            .unwrap();

        let store = TracingStore::new();
        store.hydrate(&kv).await;
        assert_eq!(store.recent_traces(None, 10).len(), 1);
    }
}
