//! Per-IP SMTP probing.
//!
//! [`SmtpIpAnalyzer::crawl`] connects to one address, reads the greeting,
//! announces itself with `EHLO`, optionally upgrades with `STARTTLS` and
//! reports everything it saw as an [`SmtpConversation`].

mod analyzer;
mod error;
mod options;
mod software;
mod stream;
mod types;

pub use analyzer::{IpAnalyzer, SmtpIpAnalyzer};
pub use error::{ProbeError, Stage};
pub use options::ProbeOptions;
pub use types::{ErrorKind, SmtpConversation};

#[cfg(test)]
mod tests;
