//! Per-domain visit results.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::mx::{MxLookupFailure, MxLookupResult};
use crate::smtp::SmtpConversation;

/// One domain to crawl, identified by the caller's visit id.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VisitRequest {
    pub visit_id: String,
    pub domain_name: String,
}

impl VisitRequest {
    pub fn new(visit_id: impl Into<String>, domain_name: impl Into<String>) -> Self {
        Self {
            visit_id: visit_id.into(),
            domain_name: domain_name.into(),
        }
    }

    /// Request with a random v4 UUID as visit id.
    pub fn random(domain_name: impl Into<String>) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), domain_name)
    }
}

/// How MX resolution for the visited domain ended.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlStatus {
    Ok,
    NoMxRecords,
    NullMx,
    HostNotFound,
    InvalidHostname,
    DnsTimeout,
    DnsFailure,
}

impl CrawlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::NoMxRecords => "no_mx_records",
            Self::NullMx => "null_mx",
            Self::HostNotFound => "host_not_found",
            Self::InvalidHostname => "invalid_hostname",
            Self::DnsTimeout => "dns_timeout",
            Self::DnsFailure => "dns_failure",
        }
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&MxLookupResult> for CrawlStatus {
    fn from(result: &MxLookupResult) -> Self {
        match result {
            MxLookupResult::Records(_) => Self::Ok,
            MxLookupResult::NoRecords => Self::NoMxRecords,
            MxLookupResult::NullMx => Self::NullMx,
            MxLookupResult::Failed(MxLookupFailure::HostNotFound) => Self::HostNotFound,
            MxLookupResult::Failed(MxLookupFailure::InvalidHostname(_)) => Self::InvalidHostname,
            MxLookupResult::Failed(MxLookupFailure::Timeout) => Self::DnsTimeout,
            MxLookupResult::Failed(MxLookupFailure::QueryFailed(_)) => Self::DnsFailure,
        }
    }
}

/// A mail host of the visited domain with one conversation per resolved IP.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpHost {
    pub hostname: String,
    pub priority: u16,
    /// False for the implicit MX (the domain itself).
    pub from_mx: bool,
    pub conversations: Vec<SmtpConversation>,
}

impl SmtpHost {
    pub fn new(hostname: impl Into<String>, priority: u16, from_mx: bool) -> Self {
        Self {
            hostname: hostname.into(),
            priority,
            from_mx,
            conversations: Vec::new(),
        }
    }
}

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpVisit {
    pub visit_id: String,
    pub domain_name: String,
    pub timestamp: DateTime<Utc>,
    pub crawl_status: CrawlStatus,
    pub dns_error: Option<String>,
    pub hosts: Vec<SmtpHost>,
}

impl SmtpVisit {
    pub fn new(visit_id: impl Into<String>, domain_name: impl Into<String>) -> Self {
        Self {
            visit_id: visit_id.into(),
            domain_name: domain_name.into(),
            timestamp: Utc::now(),
            crawl_status: CrawlStatus::Ok,
            dns_error: None,
            hosts: Vec::new(),
        }
    }

    pub fn num_conversations(&self) -> usize {
        self.hosts.iter().map(|host| host.conversations.len()).sum()
    }

    pub fn conversations(&self) -> impl Iterator<Item = (&SmtpHost, &SmtpConversation)> {
        self.hosts
            .iter()
            .flat_map(|host| host.conversations.iter().map(move |c| (host, c)))
    }
}

/// Multi-line human summary; timestamps are left out.
impl fmt::Display for SmtpVisit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "visit {} {} status={} hosts={} conversations={}",
            self.visit_id,
            self.domain_name,
            self.crawl_status,
            self.hosts.len(),
            self.num_conversations()
        )?;
        if let Some(error) = &self.dns_error {
            write!(f, "\n  dns error: {error}")?;
        }
        for host in &self.hosts {
            let origin = if host.from_mx { "mx" } else { "implicit" };
            write!(f, "\n  {origin} {} {}", host.priority, host.hostname)?;
            if host.conversations.is_empty() {
                write!(f, "\n    (no addresses)")?;
            }
            for conversation in &host.conversations {
                write!(f, "\n    {}", conversation.summary())?;
            }
        }
        Ok(())
    }
}
