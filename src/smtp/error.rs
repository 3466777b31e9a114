use std::fmt;
use std::io;

use thiserror::Error;

use super::ErrorKind;

/// Step of the conversation during which something went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connect,
    Greeting,
    Ehlo,
    Helo,
    StartTls,
    TlsHandshake,
    Quit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::Greeting => "greeting",
            Self::Ehlo => "EHLO",
            Self::Helo => "HELO",
            Self::StartTls => "STARTTLS",
            Self::TlsHandshake => "TLS handshake",
            Self::Quit => "QUIT",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("TLS connector could not be built: {source}")]
    TlsSetup {
        #[source]
        source: native_tls::Error,
    },
    #[error("connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("I/O error during {stage}: {source}")]
    Io {
        stage: Stage,
        #[source]
        source: io::Error,
    },
    #[error("unexpected reply code {code} to {stage}")]
    UnexpectedReply { stage: Stage, code: u16 },
    #[error("malformed reply to {stage}: {detail}")]
    Malformed { stage: Stage, detail: String },
    #[error("TLS handshake failed: {detail}")]
    Tls { detail: String },
}

impl ProbeError {
    pub(crate) fn io(stage: Stage, source: io::Error) -> Self {
        Self::Io { stage, source }
    }

    pub(crate) fn malformed(stage: Stage, detail: impl Into<String>) -> Self {
        Self::Malformed {
            stage,
            detail: detail.into(),
        }
    }

    /// Error category stored on the conversation.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TlsSetup { .. } | Self::Tls { .. } => ErrorKind::TlsHandshakeFailed,
            Self::Connect { source, .. } => match source.kind() {
                io::ErrorKind::ConnectionRefused => ErrorKind::ConnectionRefused,
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ErrorKind::ConnectTimeout,
                _ => ErrorKind::NetworkError,
            },
            Self::Io { source, .. } => match source.kind() {
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ErrorKind::ReadTimeout,
                io::ErrorKind::InvalidData => ErrorKind::MalformedResponse,
                _ => ErrorKind::NetworkError,
            },
            Self::UnexpectedReply { .. } => ErrorKind::UnexpectedReplyCode,
            Self::Malformed { .. } => ErrorKind::MalformedResponse,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refused_connect_is_classified() {
        let err = ProbeError::Connect {
            addr: "192.0.2.1:25".to_string(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert_eq!(err.kind(), ErrorKind::ConnectionRefused);
    }

    #[test]
    fn read_timeouts_cover_would_block() {
        let err = ProbeError::io(Stage::Greeting, io::Error::from(io::ErrorKind::WouldBlock));
        assert_eq!(err.kind(), ErrorKind::ReadTimeout);
        let err = ProbeError::io(Stage::Ehlo, io::Error::from(io::ErrorKind::TimedOut));
        assert_eq!(err.kind(), ErrorKind::ReadTimeout);
    }

    #[test]
    fn closed_connection_is_a_network_error() {
        let err = ProbeError::io(Stage::Ehlo, io::Error::from(io::ErrorKind::UnexpectedEof));
        assert_eq!(err.kind(), ErrorKind::NetworkError);
        assert_eq!(
            err.to_string(),
            "I/O error during EHLO: unexpected end of file"
        );
    }
}
