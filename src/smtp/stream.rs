use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use native_tls::{HandshakeError, TlsConnector, TlsStream};

use super::error::{ProbeError, Stage};

const MAX_LINE_LEN: usize = 4096;
const MAX_REPLY_LINES: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SmtpReply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl SmtpReply {
    pub fn is_positive_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// The reply as the server sent it, one `code text` line per entry.
    pub fn raw(&self) -> String {
        self.lines
            .iter()
            .map(|line| {
                if line.is_empty() {
                    self.code.to_string()
                } else {
                    format!("{} {}", self.code, line)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// EHLO keywords: every line but the first (which echoes the server
    /// name), keyword upper-cased, parameters kept.
    pub fn extensions(&self) -> Vec<String> {
        self.lines
            .iter()
            .skip(1)
            .filter_map(|line| {
                let trimmed = line.trim();
                let mut parts = trimmed.splitn(2, char::is_whitespace);
                let keyword = parts.next().filter(|k| !k.is_empty())?;
                let keyword = keyword.to_ascii_uppercase();
                Some(match parts.next().map(str::trim).filter(|p| !p.is_empty()) {
                    Some(params) => format!("{keyword} {params}"),
                    None => keyword,
                })
            })
            .collect()
    }
}

#[derive(Debug)]
enum StreamState {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    Invalid,
}

#[derive(Debug)]
pub(crate) struct SmtpStream {
    state: StreamState,
    buffer: Vec<u8>,
    /// Budget for a whole reply, not for a single `read()`.
    read_timeout: Duration,
}

impl SmtpStream {
    pub fn connect(
        addr: &SocketAddr,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, ProbeError> {
        let stream = TcpStream::connect_timeout(addr, connect_timeout).map_err(|err| {
            ProbeError::Connect {
                addr: addr.to_string(),
                source: err,
            }
        })?;
        stream
            .set_read_timeout(Some(read_timeout))
            .map_err(|err| ProbeError::io(Stage::Connect, err))?;
        stream
            .set_write_timeout(Some(read_timeout))
            .map_err(|err| ProbeError::io(Stage::Connect, err))?;
        Ok(Self {
            state: StreamState::Plain(stream),
            buffer: Vec::new(),
            read_timeout,
        })
    }

    pub fn upgrade_tls(&mut self, domain: &str, connector: &TlsConnector) -> Result<(), ProbeError> {
        let plain = match std::mem::replace(&mut self.state, StreamState::Invalid) {
            StreamState::Plain(stream) => stream,
            StreamState::Tls(stream) => {
                self.state = StreamState::Tls(stream);
                return Ok(());
            }
            StreamState::Invalid => {
                return Err(ProbeError::malformed(Stage::TlsHandshake, "invalid stream state"));
            }
        };
        // Bytes pipelined before the handshake would be read as TLS records.
        self.buffer.clear();
        plain
            .set_read_timeout(Some(self.read_timeout))
            .map_err(|err| ProbeError::io(Stage::TlsHandshake, err))?;
        let tls = complete_handshake(connector, domain, plain)?;
        self.state = StreamState::Tls(Box::new(tls));
        Ok(())
    }

    pub fn command(&mut self, command: &str, stage: Stage) -> Result<SmtpReply, ProbeError> {
        let mut data = command.as_bytes().to_vec();
        data.extend_from_slice(b"\r\n");
        self.write_all(&data)
            .map_err(|err| ProbeError::io(stage, err))?;
        self.read_reply(stage)
    }

    /// Sends `QUIT` and waits for the answer, ignoring every failure.
    pub fn quit(&mut self) {
        if let Err(err) = self.command("QUIT", Stage::Quit) {
            tracing::trace!(error = %err, "QUIT not acknowledged");
        }
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match &mut self.state {
            StreamState::Plain(stream) => {
                stream.write_all(data)?;
                stream.flush()
            }
            StreamState::Tls(stream) => {
                stream.write_all(data)?;
                stream.flush()
            }
            StreamState::Invalid => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "invalid stream state",
            )),
        }
    }

    pub fn read_reply(&mut self, stage: Stage) -> Result<SmtpReply, ProbeError> {
        let deadline = Instant::now() + self.read_timeout;
        let mut lines = Vec::new();
        let mut code: Option<u16> = None;
        loop {
            let line = self.read_line(stage, deadline)?;
            if line.len() < 3 {
                return Err(ProbeError::malformed(stage, format!("invalid reply: '{line}'")));
            }
            let parsed_code = line
                .get(..3)
                .and_then(|digits| digits.parse::<u16>().ok())
                .filter(|value| (100..600).contains(value))
                .ok_or_else(|| {
                    ProbeError::malformed(stage, format!("invalid code in line: '{line}'"))
                })?;
            if let Some(existing) = code {
                if existing != parsed_code {
                    return Err(ProbeError::malformed(
                        stage,
                        format!("inconsistent reply codes: {existing} vs {parsed_code}"),
                    ));
                }
            } else {
                code = Some(parsed_code);
            }
            let separator = line.as_bytes().get(3).copied();
            if !matches!(separator, None | Some(b' ') | Some(b'-')) {
                return Err(ProbeError::malformed(stage, format!("invalid separator in line: '{line}'")));
            }
            lines.push(line.get(4..).unwrap_or("").to_string());
            if separator != Some(b'-') {
                break;
            }
            if lines.len() >= MAX_REPLY_LINES {
                return Err(ProbeError::malformed(stage, "reply has too many lines"));
            }
        }
        Ok(SmtpReply {
            code: code.unwrap_or_default(),
            lines,
        })
    }

    fn read_line(&mut self, stage: Stage, deadline: Instant) -> Result<String, ProbeError> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|byte| *byte == b'\n') {
                let mut line = self.buffer.drain(..=pos).collect::<Vec<_>>();
                if line.ends_with(b"\r\n") {
                    line.truncate(line.len() - 2);
                } else {
                    line.truncate(line.len() - 1);
                }
                return Ok(String::from_utf8_lossy(&line).into_owned());
            }
            if self.buffer.len() > MAX_LINE_LEN {
                return Err(ProbeError::malformed(stage, "reply line too long"));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ProbeError::io(
                    stage,
                    io::Error::new(io::ErrorKind::TimedOut, "reply not complete before read timeout"),
                ));
            }

            let mut buf = [0u8; 1024];
            let read = match &mut self.state {
                StreamState::Plain(stream) => stream
                    .set_read_timeout(Some(remaining))
                    .and_then(|()| stream.read(&mut buf)),
                StreamState::Tls(stream) => stream
                    .get_ref()
                    .set_read_timeout(Some(remaining))
                    .and_then(|()| stream.read(&mut buf)),
                StreamState::Invalid => {
                    return Err(ProbeError::malformed(stage, "invalid stream state"));
                }
            };
            let read = read.map_err(|err| ProbeError::io(stage, err))?;
            if read == 0 {
                return Err(ProbeError::io(
                    stage,
                    io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed"),
                ));
            }
            self.buffer.extend_from_slice(&buf[..read]);
        }
    }
}

fn complete_handshake(
    connector: &TlsConnector,
    domain: &str,
    stream: TcpStream,
) -> Result<TlsStream<TcpStream>, ProbeError> {
    match connector.connect(domain, stream) {
        Ok(tls) => Ok(tls),
        Err(HandshakeError::Failure(err)) => Err(ProbeError::Tls {
            detail: err.to_string(),
        }),
        // Blocking socket: WouldBlock only surfaces when the read timeout fired.
        Err(HandshakeError::WouldBlock(_)) => Err(ProbeError::Tls {
            detail: "handshake timed out".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(code: u16, lines: &[&str]) -> SmtpReply {
        SmtpReply {
            code,
            lines: lines.iter().map(|l| l.to_string()).collect(),
        }
    }

    #[test]
    fn extensions_skip_greeting_line_and_normalize_keyword() {
        let ehlo = reply(
            250,
            &["mx.example.com Hello", "pipelining", "SIZE 10240000", "starttls", "8BITMIME"],
        );
        assert_eq!(
            ehlo.extensions(),
            vec!["PIPELINING", "SIZE 10240000", "STARTTLS", "8BITMIME"]
        );
    }

    #[test]
    fn raw_reply_keeps_codes_per_line() {
        let greeting = reply(220, &["mx.example.com ESMTP", "ready"]);
        assert_eq!(greeting.raw(), "220 mx.example.com ESMTP\n220 ready");
        assert_eq!(reply(220, &[""]).raw(), "220");
    }
}
