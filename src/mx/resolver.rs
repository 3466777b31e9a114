use std::net::IpAddr;

use trust_dns_resolver::Resolver;
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};
use trust_dns_resolver::proto::op::ResponseCode;

use super::{MxLookupFailure, MxLookupResult, MxRecord};

/// Looks up MX records for `domain` through `resolver` and classifies the
/// answer. Records come back sorted (ascending preference, then exchange)
/// without duplicates.
pub(crate) fn resolve_mx_with<R>(resolver: &R, domain: &str) -> MxLookupResult
where
    R: DnsLookup + ?Sized,
{
    let ascii = match normalize_domain(domain) {
        Ok(ascii) => ascii,
        Err(reason) => return MxLookupResult::Failed(MxLookupFailure::InvalidHostname(reason)),
    };

    let mut records = match resolver.lookup_mx(&fqdn(&ascii)) {
        Ok(records) => records,
        Err(err) => return classify_error(&err),
    };

    records.sort();
    records.dedup();

    if records.is_empty() {
        return MxLookupResult::NoRecords;
    }

    let before = records.len();
    records.retain(|record| !record.exchange.is_empty());
    if records.is_empty() {
        return MxLookupResult::NullMx;
    }
    if records.len() != before {
        tracing::debug!(domain = %ascii, "ignoring null MX entry next to real exchanges");
    }
    MxLookupResult::Records(records)
}

/// Resolves A/AAAA for `hostname`. Duplicates are dropped, resolver order is
/// kept. Resolution failures yield an empty list.
pub(crate) fn resolve_ips_with<R>(resolver: &R, hostname: &str) -> Vec<IpAddr>
where
    R: DnsLookup + ?Sized,
{
    if let Ok(ip) = hostname.parse::<IpAddr>() {
        return vec![ip];
    }
    let ascii = match normalize_domain(hostname) {
        Ok(ascii) => ascii,
        Err(reason) => {
            tracing::warn!(hostname, %reason, "cannot resolve invalid hostname");
            return Vec::new();
        }
    };
    match resolver.lookup_ip(&fqdn(&ascii)) {
        Ok(addresses) => {
            let mut unique = Vec::with_capacity(addresses.len());
            for address in addresses {
                if !unique.contains(&address) {
                    unique.push(address);
                }
            }
            unique
        }
        Err(err) => {
            if !matches!(err.kind(), ResolveErrorKind::NoRecordsFound { .. }) {
                tracing::warn!(hostname = %ascii, error = %err, "address lookup failed");
            }
            Vec::new()
        }
    }
}

pub(crate) fn classify_error(err: &ResolveError) -> MxLookupResult {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. } => {
            if *response_code == ResponseCode::NXDomain {
                MxLookupResult::Failed(MxLookupFailure::HostNotFound)
            } else {
                MxLookupResult::NoRecords
            }
        }
        ResolveErrorKind::Timeout => MxLookupResult::Failed(MxLookupFailure::Timeout),
        ResolveErrorKind::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => {
            MxLookupResult::Failed(MxLookupFailure::Timeout)
        }
        _ => MxLookupResult::Failed(MxLookupFailure::QueryFailed(err.to_string())),
    }
}

pub(crate) fn normalize_domain(domain: &str) -> Result<String, String> {
    let trimmed = domain.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return Err("domain is empty".to_string());
    }
    let ascii = idna::domain_to_ascii(trimmed).map_err(|err| err.to_string())?;
    if ascii.is_empty() {
        return Err("domain empty after IDNA conversion".to_string());
    }
    if ascii.split('.').any(|label| label.is_empty() || label.len() > 63) {
        return Err(format!("domain '{ascii}' has an empty or oversized label"));
    }
    Ok(ascii)
}

pub(crate) fn normalize_exchange(exchange: String) -> String {
    let trimmed = exchange.trim_end_matches('.');
    trimmed.to_ascii_lowercase()
}

fn fqdn(ascii: &str) -> String {
    format!("{ascii}.")
}

pub(crate) trait DnsLookup: Send + Sync {
    fn lookup_mx(&self, name: &str) -> Result<Vec<MxRecord>, ResolveError>;

    fn lookup_ip(&self, name: &str) -> Result<Vec<IpAddr>, ResolveError>;
}

impl DnsLookup for Resolver {
    fn lookup_mx(&self, name: &str) -> Result<Vec<MxRecord>, ResolveError> {
        let lookup = Resolver::mx_lookup(self, name)?;
        let mut records = Vec::new();
        for mx in lookup.iter() {
            let exchange = normalize_exchange(mx.exchange().to_utf8());
            records.push(MxRecord::new(mx.preference(), exchange));
        }
        Ok(records)
    }

    fn lookup_ip(&self, name: &str) -> Result<Vec<IpAddr>, ResolveError> {
        let lookup = Resolver::lookup_ip(self, name)?;
        Ok(lookup.iter().collect())
    }
}
