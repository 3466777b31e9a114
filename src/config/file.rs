//! Mirror of the TOML configuration file. Every field is optional and only
//! overrides the compiled default when present.

use serde::Deserialize;

#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub(crate) dns: DnsSection,
    #[serde(default)]
    pub(crate) smtp: SmtpSection,
    #[serde(default)]
    pub(crate) analyzer: AnalyzerSection,
    #[serde(default)]
    pub(crate) cache: CacheSection,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub(crate) struct DnsSection {
    pub(crate) timeout_ms: Option<u64>,
    pub(crate) attempts: Option<usize>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub(crate) struct SmtpSection {
    pub(crate) port: Option<u16>,
    pub(crate) helo_domain: Option<String>,
    pub(crate) connect_timeout_ms: Option<u64>,
    pub(crate) read_timeout_ms: Option<u64>,
    pub(crate) attempt_start_tls: Option<bool>,
    pub(crate) attempt_tls_handshake: Option<bool>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub(crate) struct AnalyzerSection {
    pub(crate) max_concurrent_ip_probes: Option<usize>,
    pub(crate) fallback_to_domain_if_no_mx: Option<bool>,
    pub(crate) max_hosts_to_contact: Option<usize>,
    pub(crate) skip_ipv4: Option<bool>,
    pub(crate) skip_ipv6: Option<bool>,
    pub(crate) visit_deadline_ms: Option<u64>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub(crate) struct CacheSection {
    pub(crate) ttl_secs: Option<u64>,
}
