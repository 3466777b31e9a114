//! Increment-only metrics seam.
//!
//! The crawler never talks to a telemetry backend directly: every component
//! receives an `Arc<dyn MetricsSink>` at construction time. [`InMemoryMetrics`]
//! keeps the values in process (tests, CLI summary) and [`NoopMetrics`]
//! discards them.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;

pub const CACHE_HITS: &str = "smtp.cache.hits";
pub const CACHE_MISSES: &str = "smtp.cache.misses";
pub const CONVERSATION_SUCCESS: &str = "smtp.conversation.success";
pub const CONVERSATION_FAILURE: &str = "smtp.conversation.failure";
pub const CONNECT_TIME: &str = "smtp.conversation.connect_time";
pub const VISIT_DURATION: &str = "smtp.visit.duration";

/// Sink for counters and timer samples. Implementations must tolerate
/// concurrent calls from every probe worker.
pub trait MetricsSink: Send + Sync {
    fn increment(&self, name: &'static str);

    fn record_duration(&self, name: &'static str, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn increment(&self, _name: &'static str) {}

    fn record_duration(&self, _name: &'static str, _duration: Duration) {}
}

/// Process-local registry.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    counters: Mutex<HashMap<&'static str, u64>>,
    timers: Mutex<HashMap<&'static str, Vec<Duration>>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter; `0` when it was never incremented.
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }

    /// Samples recorded for a timer, in recording order.
    pub fn durations(&self, name: &str) -> Vec<Duration> {
        self.timers.lock().get(name).cloned().unwrap_or_default()
    }

    pub fn snapshot(&self) -> Vec<(&'static str, u64)> {
        let mut values: Vec<_> = self
            .counters
            .lock()
            .iter()
            .map(|(name, value)| (*name, *value))
            .collect();
        values.sort();
        values
    }
}

impl MetricsSink for InMemoryMetrics {
    fn increment(&self, name: &'static str) {
        *self.counters.lock().entry(name).or_insert(0) += 1;
    }

    fn record_duration(&self, name: &'static str, duration: Duration) {
        self.timers.lock().entry(name).or_default().push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn unknown_counter_reads_zero() {
        let metrics = InMemoryMetrics::new();
        assert_eq!(metrics.counter(CACHE_HITS), 0);
        assert!(metrics.durations(CONNECT_TIME).is_empty());
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let metrics = Arc::new(InMemoryMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..100 {
                        metrics.increment(CACHE_MISSES);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker");
        }
        assert_eq!(metrics.counter(CACHE_MISSES), 800);
    }

    #[test]
    fn snapshot_is_sorted_by_name() {
        let metrics = InMemoryMetrics::new();
        metrics.increment(CACHE_MISSES);
        metrics.increment(CACHE_HITS);
        metrics.increment(CACHE_HITS);
        assert_eq!(
            metrics.snapshot(),
            vec![(CACHE_HITS, 2), (CACHE_MISSES, 1)]
        );
    }
}
