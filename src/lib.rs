#![forbid(unsafe_code)]
//! smtp_crawler — SMTP/TLS posture crawler
//!
//! Resolves the MX hosts of a domain, holds one SMTP conversation per
//! distinct mail-server IP and assembles the observations into an
//! [`SmtpVisit`] that can be stored and retrieved through an
//! [`SmtpRepository`].

pub mod analyzer;
pub mod cache;
pub mod config;
pub mod crawler;
pub mod metrics;
pub mod mx;
pub mod repository;
pub mod smtp;
pub mod visit;

pub use analyzer::{AnalyzerOptions, SmtpAnalyzer};
pub use cache::{CacheOptions, SmtpConversationCache};
pub use config::{ConfigError, ConfigFile, CrawlerConfig};
pub use crawler::{CrawlerError, SmtpCrawler};
pub use metrics::{InMemoryMetrics, MetricsSink, NoopMetrics};
pub use mx::{
    DnsMxFinder, DnsOptions, Error as MxError, MxFinder, MxLookupFailure, MxLookupResult,
    MxRecord,
};
pub use repository::{MemoryRepository, RepositoryError, SmtpRepository};
pub use smtp::{
    ErrorKind, IpAnalyzer, ProbeError, ProbeOptions, SmtpConversation, SmtpIpAnalyzer,
};
pub use visit::{CrawlStatus, SmtpHost, SmtpVisit, VisitRequest};
