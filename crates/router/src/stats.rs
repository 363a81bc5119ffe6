//! Routing statistics for later inspection.

use std::collections::HashMap;
use std::sync::Mutex;

/// Counters accumulated across routing decisions.
#[derive(Debug, Default, Clone)]
pub struct StatsSnapshot {
    pub attempts: u64,
    pub by_collection: HashMap<String, u64>,
    pub specialized_hits: u64,
    /// Decisions bucketed by confidence decile (index 0 = [0.0, 0.1)).
    pub confidence_buckets: [u64; 10],
    pub low_confidence: u64,
}

#[derive(Debug, Default)]
pub struct RouterStats {
    inner: Mutex<StatsSnapshot>,
}

impl RouterStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, collection: &str, confidence: f32, specialized: bool, low: bool) {
        let Ok(mut stats) = self.inner.lock() else {
            return;
        };
        stats.attempts += 1;
        *stats.by_collection.entry(collection.to_string()).or_default() += 1;
        if specialized {
            stats.specialized_hits += 1;
        }
        if low {
            stats.low_confidence += 1;
        }
        let bucket = ((confidence * 10.0) as usize).min(9);
        stats.confidence_buckets[bucket] += 1;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.inner
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}
