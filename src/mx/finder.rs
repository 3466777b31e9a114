use std::net::IpAddr;
use std::time::Duration;

use trust_dns_resolver::Resolver;
use trust_dns_resolver::config::{LookupIpStrategy, ResolverConfig, ResolverOpts};

use super::resolver::{DnsLookup, resolve_ips_with, resolve_mx_with};
use super::{Error, MxLookupResult};

/// Capability used by the analyzer to discover mail hosts.
pub trait MxFinder: Send + Sync {
    fn find_mx_records_for(&self, domain: &str) -> MxLookupResult;

    /// Addresses of `hostname`; empty when the name does not resolve.
    fn find_ip_addresses(&self, hostname: &str) -> Vec<IpAddr>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsOptions {
    pub timeout: Duration,
    pub attempts: usize,
}

impl Default for DnsOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            attempts: 2,
        }
    }
}

/// [`MxFinder`] backed by the synchronous trust-dns resolver.
pub struct DnsMxFinder {
    lookup: Box<dyn DnsLookup>,
}

impl DnsMxFinder {
    /// Builds a resolver from the system configuration (falling back to the
    /// library defaults when it cannot be read) with `options` applied.
    pub fn new(options: &DnsOptions) -> Result<Self, Error> {
        let (config, opts) = match trust_dns_resolver::system_conf::read_system_conf() {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!(error = %err, "system resolver configuration unavailable, using defaults");
                (ResolverConfig::default(), ResolverOpts::default())
            }
        };
        let resolver =
            Resolver::new(config, resolver_opts(opts, options)).map_err(Error::resolver_init)?;
        Ok(Self::with_lookup(resolver))
    }

    pub(crate) fn with_lookup<L>(lookup: L) -> Self
    where
        L: DnsLookup + 'static,
    {
        Self {
            lookup: Box::new(lookup),
        }
    }
}

/// Both A and AAAA are queried for every host; the resolver default only asks
/// for AAAA when no A record exists.
pub(crate) fn resolver_opts(mut opts: ResolverOpts, options: &DnsOptions) -> ResolverOpts {
    opts.timeout = options.timeout;
    opts.attempts = options.attempts.max(1);
    opts.ip_strategy = LookupIpStrategy::Ipv4AndIpv6;
    opts
}

impl std::fmt::Debug for DnsMxFinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsMxFinder").finish_non_exhaustive()
    }
}

impl MxFinder for DnsMxFinder {
    fn find_mx_records_for(&self, domain: &str) -> MxLookupResult {
        let result = resolve_mx_with(self.lookup.as_ref(), domain);
        tracing::debug!(domain, ?result, "MX lookup finished");
        result
    }

    fn find_ip_addresses(&self, hostname: &str) -> Vec<IpAddr> {
        let addresses = resolve_ips_with(self.lookup.as_ref(), hostname);
        tracing::debug!(hostname, count = addresses.len(), "address lookup finished");
        addresses
    }
}
