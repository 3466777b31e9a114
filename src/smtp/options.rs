use std::borrow::Cow;
use std::time::Duration;

/// Controls how [`SmtpIpAnalyzer`](super::SmtpIpAnalyzer) talks to a mail
/// server. Fixed for the lifetime of the analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOptions {
    pub port: u16,
    pub helo_domain: Option<String>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub attempt_start_tls: bool,
    /// Complete the TLS handshake after a `220` STARTTLS reply. Only
    /// meaningful together with `attempt_start_tls`.
    pub attempt_tls_handshake: bool,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            port: 25,
            helo_domain: None,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
            attempt_start_tls: true,
            attempt_tls_handshake: false,
        }
    }
}

impl ProbeOptions {
    /// Name announced in `EHLO`/`HELO`. Defaults to `localhost`.
    pub fn helo_name(&self) -> Cow<'_, str> {
        self.helo_domain
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(Cow::Borrowed)
            .unwrap_or(Cow::Borrowed("localhost"))
    }

    pub fn tls_handshake_enabled(&self) -> bool {
        self.attempt_start_tls && self.attempt_tls_handshake
    }
}
