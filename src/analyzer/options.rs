use std::time::Duration;

/// Visit-level knobs of [`SmtpAnalyzer`](super::SmtpAnalyzer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerOptions {
    /// Worker threads per visit. Values below 1 are treated as 1.
    pub max_concurrent_ip_probes: usize,
    /// Probe the domain itself (implicit MX) when it has no MX records.
    pub fallback_to_domain_if_no_mx: bool,
    pub max_hosts_to_contact: usize,
    pub skip_ipv4: bool,
    pub skip_ipv6: bool,
    /// IPs whose probe has not started when this elapses are skipped.
    pub visit_deadline: Option<Duration>,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            max_concurrent_ip_probes: 4,
            fallback_to_domain_if_no_mx: true,
            max_hosts_to_contact: 10,
            skip_ipv4: false,
            skip_ipv6: false,
            visit_deadline: None,
        }
    }
}

impl AnalyzerOptions {
    pub(crate) fn pool_size(&self) -> usize {
        self.max_concurrent_ip_probes.max(1)
    }
}
