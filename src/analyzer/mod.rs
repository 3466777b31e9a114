//! Per-domain orchestration: MX hosts, their addresses and one cached SMTP
//! conversation per distinct IP, assembled into an [`SmtpVisit`].

mod options;

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::cache::SmtpConversationCache;
use crate::metrics::{self, MetricsSink};
use crate::mx::{MxFinder, MxLookupResult};
use crate::smtp::{IpAnalyzer, SmtpConversation};
use crate::visit::{CrawlStatus, SmtpHost, SmtpVisit};

pub use options::AnalyzerOptions;

pub struct SmtpAnalyzer {
    metrics: Arc<dyn MetricsSink>,
    ip_analyzer: Arc<dyn IpAnalyzer>,
    mx_finder: Arc<dyn MxFinder>,
    cache: Arc<SmtpConversationCache>,
    options: AnalyzerOptions,
}

impl std::fmt::Debug for SmtpAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpAnalyzer")
            .field("cache", &self.cache)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl SmtpAnalyzer {
    pub fn new(
        metrics: Arc<dyn MetricsSink>,
        ip_analyzer: Arc<dyn IpAnalyzer>,
        mx_finder: Arc<dyn MxFinder>,
        cache: Arc<SmtpConversationCache>,
        options: AnalyzerOptions,
    ) -> Self {
        Self {
            metrics,
            ip_analyzer,
            mx_finder,
            cache,
            options,
        }
    }

    /// Crawls the mail hosts of `domain_name`. Never fails: DNS problems end
    /// up in `crawl_status`/`dns_error`, probe problems in the conversations.
    ///
    /// The returned visit carries a fresh random id; callers with their own
    /// id overwrite it.
    pub fn analyze(&self, domain_name: &str) -> SmtpVisit {
        let started = Instant::now();
        let mut visit = SmtpVisit::new(uuid::Uuid::new_v4().to_string(), domain_name);

        let lookup = self.mx_finder.find_mx_records_for(domain_name);
        visit.crawl_status = CrawlStatus::from(&lookup);
        let targets: Vec<(SmtpHost, Vec<IpAddr>)> = match &lookup {
            MxLookupResult::Records(records) => {
                if records.len() > self.options.max_hosts_to_contact {
                    tracing::debug!(
                        domain = domain_name,
                        found = records.len(),
                        limit = self.options.max_hosts_to_contact,
                        "contacting only the preferred MX hosts"
                    );
                }
                records
                    .iter()
                    .take(self.options.max_hosts_to_contact)
                    .map(|record| {
                        self.resolve_host(SmtpHost::new(&record.exchange, record.preference, true))
                    })
                    .collect()
            }
            MxLookupResult::NoRecords if self.options.fallback_to_domain_if_no_mx => {
                let hostname = domain_name.trim().trim_end_matches('.');
                tracing::debug!(domain = domain_name, "no MX records, using the domain itself");
                vec![self.resolve_host(SmtpHost::new(hostname, 0, false))]
            }
            MxLookupResult::NoRecords | MxLookupResult::NullMx => {
                tracing::info!(domain = domain_name, status = %visit.crawl_status, "domain has no mail hosts");
                Vec::new()
            }
            MxLookupResult::Failed(failure) => {
                tracing::warn!(domain = domain_name, error = %failure, "MX lookup failed");
                visit.dns_error = Some(failure.to_string());
                Vec::new()
            }
        };

        let mut seen = HashSet::new();
        let distinct: Vec<IpAddr> = targets
            .iter()
            .flat_map(|(_, ips)| ips.iter().copied())
            .filter(|ip| seen.insert(*ip))
            .collect();
        let conversations = self.probe_all(&distinct, started);

        visit.hosts = targets
            .into_iter()
            .map(|(mut host, ips)| {
                host.conversations = ips
                    .iter()
                    .filter_map(|ip| conversations.get(ip))
                    .map(|conversation| SmtpConversation::clone(conversation))
                    .collect();
                host
            })
            .collect();

        let elapsed = started.elapsed();
        self.metrics.record_duration(metrics::VISIT_DURATION, elapsed);
        tracing::info!(
            domain = domain_name,
            status = %visit.crawl_status,
            hosts = visit.hosts.len(),
            conversations = visit.num_conversations(),
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "visit finished"
        );
        visit
    }

    fn resolve_host(&self, host: SmtpHost) -> (SmtpHost, Vec<IpAddr>) {
        let ips = self.mx_finder.find_ip_addresses(&host.hostname);
        if ips.is_empty() {
            tracing::debug!(hostname = %host.hostname, "host has no addresses");
        }
        (host, ips)
    }

    /// Probes `ips` on at most `max_concurrent_ip_probes` scoped workers.
    fn probe_all(
        &self,
        ips: &[IpAddr],
        started: Instant,
    ) -> HashMap<IpAddr, Arc<SmtpConversation>> {
        if ips.is_empty() {
            return HashMap::new();
        }
        let deadline = self.options.visit_deadline.map(|limit| started + limit);
        let workers = self.options.pool_size().min(ips.len());
        let next = AtomicUsize::new(0);
        let results = Mutex::new(HashMap::with_capacity(ips.len()));

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(&ip) = ips.get(index) else {
                            break;
                        };
                        let conversation = self.probe(ip, deadline);
                        results.lock().insert(ip, conversation);
                    }
                });
            }
        });

        results.into_inner()
    }

    fn probe(&self, ip: IpAddr, deadline: Option<Instant>) -> Arc<SmtpConversation> {
        if (ip.is_ipv4() && self.options.skip_ipv4) || (ip.is_ipv6() && self.options.skip_ipv6) {
            return Arc::new(SmtpConversation::skipped(ip, "address family disabled"));
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            tracing::debug!(%ip, "visit deadline reached, skipping probe");
            return Arc::new(SmtpConversation::skipped(ip, "visit deadline reached"));
        }
        self.cache.get_or_compute(ip, || {
            let conversation = self.ip_analyzer.crawl(ip).enforce_invariant();
            if conversation.connect_ok {
                self.metrics.increment(metrics::CONVERSATION_SUCCESS);
                self.metrics.record_duration(
                    metrics::CONNECT_TIME,
                    Duration::from_millis(conversation.connection_time_ms),
                );
            } else {
                self.metrics.increment(metrics::CONVERSATION_FAILURE);
            }
            conversation
        })
    }
}
