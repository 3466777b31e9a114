use std::fmt;

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MxRecord {
    pub preference: u16,
    pub exchange: String,
}

impl MxRecord {
    pub fn new(preference: u16, exchange: impl Into<String>) -> Self {
        Self {
            preference,
            exchange: exchange.into(),
        }
    }
}

/// Outcome of an MX lookup.
///
/// `NoRecords` and `NullMx` are authoritative answers (the domain has no MX
/// or explicitly refuses mail); only `Failed` means the lookup itself went
/// wrong.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MxLookupResult {
    /// Sorted by ascending preference, ties broken by exchange name.
    Records(Vec<MxRecord>),
    NoRecords,
    /// RFC 7505 `MX 0 .`
    NullMx,
    Failed(MxLookupFailure),
}

impl MxLookupResult {
    pub fn records(&self) -> &[MxRecord] {
        match self {
            Self::Records(records) => records.as_slice(),
            _ => &[],
        }
    }
}

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MxLookupFailure {
    /// NXDOMAIN
    HostNotFound,
    InvalidHostname(String),
    Timeout,
    QueryFailed(String),
}

impl fmt::Display for MxLookupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HostNotFound => f.write_str("domain does not exist (NXDOMAIN)"),
            Self::InvalidHostname(reason) => write!(f, "invalid hostname: {reason}"),
            Self::Timeout => f.write_str("DNS query timed out"),
            Self::QueryFailed(message) => write!(f, "DNS query failed: {message}"),
        }
    }
}
