//! Single-flight memoization of SMTP conversations by IP.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::metrics::{self, MetricsSink};
use crate::smtp::SmtpConversation;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOptions {
    /// Completed entries older than this are probed again. `None` keeps them
    /// for the lifetime of the cache.
    pub ttl: Option<Duration>,
}

#[derive(Debug)]
struct Cached {
    conversation: Arc<SmtpConversation>,
    created: Instant,
}

type Slot = OnceCell<Cached>;

/// Conversations keyed by IP. Concurrent callers asking for the same IP wait
/// for a single supplier run and all receive the same `Arc`.
pub struct SmtpConversationCache {
    slots: Mutex<HashMap<IpAddr, Arc<Slot>>>,
    metrics: Arc<dyn MetricsSink>,
    options: CacheOptions,
}

impl std::fmt::Debug for SmtpConversationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConversationCache")
            .field("entries", &self.len())
            .field("options", &self.options)
            .finish()
    }
}

impl SmtpConversationCache {
    pub fn new(metrics: Arc<dyn MetricsSink>) -> Self {
        Self::with_options(metrics, CacheOptions::default())
    }

    pub fn with_options(metrics: Arc<dyn MetricsSink>, options: CacheOptions) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            metrics,
            options,
        }
    }

    /// Returns the cached conversation for `ip`, running `supplier` if there
    /// is none. The map lock is never held while `supplier` runs.
    pub fn get_or_compute<F>(&self, ip: IpAddr, supplier: F) -> Arc<SmtpConversation>
    where
        F: FnOnce() -> SmtpConversation,
    {
        let slot = self.slot_for(ip);
        let mut computed = false;
        let cached = slot.get_or_init(|| {
            computed = true;
            Cached {
                conversation: Arc::new(supplier()),
                created: Instant::now(),
            }
        });
        if computed {
            self.metrics.increment(metrics::CACHE_MISSES);
            tracing::debug!(%ip, "conversation cache miss");
        } else {
            self.metrics.increment(metrics::CACHE_HITS);
            tracing::trace!(%ip, "conversation cache hit");
        }
        Arc::clone(&cached.conversation)
    }

    fn slot_for(&self, ip: IpAddr) -> Arc<Slot> {
        let mut slots = self.slots.lock();
        if let Some(ttl) = self.options.ttl {
            let expired = slots
                .get(&ip)
                .and_then(|slot| slot.get())
                .is_some_and(|cached| cached.created.elapsed() >= ttl);
            if expired {
                slots.remove(&ip);
            }
        }
        Arc::clone(slots.entry(ip).or_default())
    }

    /// Number of keys, including ones whose conversation is still running.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    pub fn clear(&self) {
        self.slots.lock().clear();
    }
}
