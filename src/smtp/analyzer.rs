use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use native_tls::TlsConnector;

use super::error::{ProbeError, Stage};
use super::options::ProbeOptions;
use super::software;
use super::stream::SmtpStream;
use super::types::SmtpConversation;

/// Holds one SMTP conversation with one IP. Implementations never fail:
/// problems end up in the conversation's `error_kind`.
pub trait IpAnalyzer: Send + Sync {
    fn crawl(&self, ip: IpAddr) -> SmtpConversation;
}

/// Blocking [`IpAnalyzer`]: banner, `EHLO` (falling back to `HELO`), optional
/// `STARTTLS` and TLS handshake, `QUIT`.
#[derive(Debug)]
pub struct SmtpIpAnalyzer {
    options: ProbeOptions,
    connector: Option<TlsConnector>,
}

impl SmtpIpAnalyzer {
    pub fn new(options: ProbeOptions) -> Result<Self, ProbeError> {
        let connector = if options.tls_handshake_enabled() {
            // Probe only: no certificate or hostname validation.
            let connector = TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .use_sni(false)
                .build()
                .map_err(|source| ProbeError::TlsSetup { source })?;
            Some(connector)
        } else {
            None
        };
        Ok(Self { options, connector })
    }

    fn converse(&self, ip: IpAddr) -> Result<SmtpConversation, ProbeError> {
        let mut conversation = SmtpConversation::new(ip);
        let addr = SocketAddr::new(ip, self.options.port);

        let started = Instant::now();
        let mut stream =
            SmtpStream::connect(&addr, self.options.connect_timeout, self.options.read_timeout)?;
        let greeting = stream.read_reply(Stage::Greeting)?;
        conversation.connection_time_ms =
            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let banner = greeting.raw();
        if let Some((name, version)) = software::detect(&banner) {
            conversation.software = Some(name);
            conversation.software_version = version;
        }
        conversation.connect_reply_code = Some(greeting.code);
        conversation.banner = Some(banner);
        if !greeting.is_positive_completion() {
            stream.quit();
            return Err(ProbeError::UnexpectedReply {
                stage: Stage::Greeting,
                code: greeting.code,
            });
        }

        let helo = self.options.helo_name();
        let ehlo = stream.command(&format!("EHLO {helo}"), Stage::Ehlo)?;
        if ehlo.is_positive_completion() {
            conversation.supported_extensions = ehlo.extensions().into_iter().collect();
        } else {
            tracing::debug!(%ip, code = ehlo.code, "EHLO rejected, trying HELO");
            let reply = stream.command(&format!("HELO {helo}"), Stage::Helo)?;
            if !reply.is_positive_completion() {
                stream.quit();
                return Err(ProbeError::UnexpectedReply {
                    stage: Stage::Helo,
                    code: reply.code,
                });
            }
        }

        if self.options.attempt_start_tls && conversation.supports("STARTTLS") {
            let reply = stream.command("STARTTLS", Stage::StartTls)?;
            conversation.start_tls_reply_code = Some(reply.code);
            if reply.code == 220 {
                // Without a connector the server now waits for a ClientHello; just hang up.
                if let Some(connector) = &self.connector {
                    stream.upgrade_tls(&ip.to_string(), connector)?;
                    conversation.start_tls_ok = true;
                    stream.quit();
                }
            } else {
                stream.quit();
            }
        } else {
            stream.quit();
        }

        conversation.connect_ok = true;
        Ok(conversation)
    }
}

impl IpAnalyzer for SmtpIpAnalyzer {
    fn crawl(&self, ip: IpAddr) -> SmtpConversation {
        let started = Instant::now();
        match self.converse(ip) {
            Ok(conversation) => {
                tracing::debug!(
                    %ip,
                    connection_time_ms = conversation.connection_time_ms,
                    start_tls_reply_code = ?conversation.start_tls_reply_code,
                    "SMTP conversation finished"
                );
                conversation
            }
            Err(err) => {
                let kind = err.kind();
                tracing::debug!(
                    %ip,
                    error_kind = %kind,
                    error = %err,
                    elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "SMTP conversation failed"
                );
                SmtpConversation::failed(ip, kind, err.to_string())
            }
        }
    }
}
