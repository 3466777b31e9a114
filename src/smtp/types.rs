use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};

/// Why a conversation did not complete.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConnectionRefused,
    ConnectTimeout,
    ReadTimeout,
    UnexpectedReplyCode,
    MalformedResponse,
    TlsHandshakeFailed,
    /// Any other I/O failure (reset, unreachable network, closed connection).
    NetworkError,
    /// The IP was not probed (disabled address family, visit deadline).
    Skipped,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionRefused => "connection_refused",
            Self::ConnectTimeout => "connect_timeout",
            Self::ReadTimeout => "read_timeout",
            Self::UnexpectedReplyCode => "unexpected_reply_code",
            Self::MalformedResponse => "malformed_response",
            Self::TlsHandshakeFailed => "tls_handshake_failed",
            Self::NetworkError => "network_error",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything observed while talking to one mail-server IP.
///
/// When `connect_ok` is false no protocol data is kept: `banner`,
/// `connect_reply_code`, `start_tls_reply_code` and the software fields are
/// `None`, `start_tls_ok` is false and `supported_extensions` is empty. Use
/// [`SmtpConversation::failed`] to build such a value.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpConversation {
    pub ip: IpAddr,
    pub banner: Option<String>,
    pub connect_ok: bool,
    pub connect_reply_code: Option<u16>,
    pub connection_time_ms: u64,
    pub start_tls_ok: bool,
    pub start_tls_reply_code: Option<u16>,
    pub supported_extensions: BTreeSet<String>,
    pub software: Option<String>,
    pub software_version: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SmtpConversation {
    /// An empty, not-yet-connected conversation stamped with the current time.
    pub fn new(ip: IpAddr) -> Self {
        Self {
            ip,
            banner: None,
            connect_ok: false,
            connect_reply_code: None,
            connection_time_ms: 0,
            start_tls_ok: false,
            start_tls_reply_code: None,
            supported_extensions: BTreeSet::new(),
            software: None,
            software_version: None,
            error_kind: None,
            error_message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(ip: IpAddr, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            error_kind: Some(kind),
            error_message: Some(message.into()),
            ..Self::new(ip)
        }
    }

    pub fn skipped(ip: IpAddr, reason: impl Into<String>) -> Self {
        Self::failed(ip, ErrorKind::Skipped, reason)
    }

    pub fn supports(&self, keyword: &str) -> bool {
        self.supported_extensions.iter().any(|ext| {
            ext.split_whitespace()
                .next()
                .is_some_and(|token| token.eq_ignore_ascii_case(keyword))
        })
    }

    /// Drops protocol data when the conversation is not connected.
    pub(crate) fn enforce_invariant(mut self) -> Self {
        if !self.connect_ok {
            self.banner = None;
            self.connect_reply_code = None;
            self.start_tls_ok = false;
            self.start_tls_reply_code = None;
            self.supported_extensions.clear();
            self.software = None;
            self.software_version = None;
        }
        self
    }

    pub fn summary(&self) -> String {
        if self.connect_ok {
            let starttls = match self.start_tls_reply_code {
                Some(code) if self.start_tls_ok => format!("starttls={code} (tls ok)"),
                Some(code) => format!("starttls={code}"),
                None => "starttls=-".to_string(),
            };
            let software = match (&self.software, &self.software_version) {
                (Some(name), Some(version)) => format!(" software={name} {version}"),
                (Some(name), None) => format!(" software={name}"),
                _ => String::new(),
            };
            format!(
                "{} ok {}ms {}{}",
                self.ip, self.connection_time_ms, starttls, software
            )
        } else {
            let kind = self.error_kind.map(|k| k.as_str()).unwrap_or("unknown");
            match &self.error_message {
                Some(message) => format!("{} failed {kind}: {message}", self.ip),
                None => format!("{} failed {kind}", self.ip),
            }
        }
    }
}
