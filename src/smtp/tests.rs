use std::io::{self, BufRead, BufReader, Write};
use std::net::{IpAddr, Ipv4Addr, TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use super::{ErrorKind, IpAnalyzer, ProbeOptions, SmtpIpAnalyzer};

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

fn spawn_mock_server(
    greeting: &'static str,
    script: Vec<(&'static str, &'static str)>,
) -> (u16, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
    let port = listener.local_addr().expect("addr").port();
    let (ready_tx, ready_rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        ready_tx.send(()).ok();
        if let Ok((mut stream, _)) = listener.accept() {
            handle_session(&mut stream, greeting, script).expect("mock session");
        }
    });
    ready_rx.recv().expect("server ready");
    (port, handle)
}

fn handle_session(
    stream: &mut TcpStream,
    greeting: &str,
    script: Vec<(&'static str, &'static str)>,
) -> io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    stream.write_all(greeting.as_bytes())?;
    stream.flush()?;
    for (expected, response) in script {
        let mut line = String::new();
        reader.read_line(&mut line)?;
        assert!(
            line.starts_with(expected),
            "expected command starting with '{expected}', got '{line}'"
        );
        stream.write_all(response.as_bytes())?;
        stream.flush()?;
    }
    Ok(())
}

fn options(port: u16) -> ProbeOptions {
    ProbeOptions {
        port,
        helo_domain: Some("crawler.test".to_string()),
        connect_timeout: Duration::from_secs(2),
        read_timeout: Duration::from_secs(2),
        attempt_start_tls: true,
        attempt_tls_handshake: false,
    }
}

fn analyzer(options: ProbeOptions) -> SmtpIpAnalyzer {
    SmtpIpAnalyzer::new(options).expect("analyzer")
}

#[test]
fn records_banner_extensions_and_starttls_code() {
    let (port, handle) = spawn_mock_server(
        "220 mock.smtp.test ESMTP Postfix\r\n",
        vec![
            (
                "EHLO crawler.test",
                "250-mock.example\r\n250-PIPELINING\r\n250-SIZE 10240000\r\n250 STARTTLS\r\n",
            ),
            ("STARTTLS", "220 2.0.0 Ready to start TLS\r\n"),
        ],
    );

    let conversation = analyzer(options(port)).crawl(LOCALHOST);
    handle.join().expect("server thread");

    assert!(conversation.connect_ok, "{conversation:?}");
    assert_eq!(conversation.ip, LOCALHOST);
    assert_eq!(conversation.banner.as_deref(), Some("220 mock.smtp.test ESMTP Postfix"));
    assert_eq!(conversation.connect_reply_code, Some(220));
    assert_eq!(conversation.start_tls_reply_code, Some(220));
    assert!(!conversation.start_tls_ok);
    assert_eq!(conversation.software.as_deref(), Some("Postfix"));
    assert!(conversation.supports("starttls"));
    assert!(conversation.supported_extensions.contains("SIZE 10240000"));
    assert_eq!(conversation.error_kind, None);
}

#[test]
fn quits_when_starttls_is_not_offered() {
    let (port, handle) = spawn_mock_server(
        "220 mock.smtp.test ESMTP\r\n",
        vec![
            ("EHLO", "250-mock.example\r\n250 8BITMIME\r\n"),
            ("QUIT", "221 2.0.0 Bye\r\n"),
        ],
    );

    let conversation = analyzer(options(port)).crawl(LOCALHOST);
    handle.join().expect("server thread");

    assert!(conversation.connect_ok);
    assert_eq!(conversation.start_tls_reply_code, None);
    assert!(conversation.supports("8BITMIME"));
}

#[test]
fn starttls_is_not_sent_when_disabled() {
    let (port, handle) = spawn_mock_server(
        "220 mock.smtp.test ESMTP\r\n",
        vec![
            ("EHLO", "250-mock.example\r\n250 STARTTLS\r\n"),
            ("QUIT", "221 2.0.0 Bye\r\n"),
        ],
    );

    let probe_options = ProbeOptions {
        attempt_start_tls: false,
        ..options(port)
    };
    let conversation = analyzer(probe_options).crawl(LOCALHOST);
    handle.join().expect("server thread");

    assert!(conversation.connect_ok);
    assert!(conversation.supports("STARTTLS"));
    assert_eq!(conversation.start_tls_reply_code, None);
}

#[test]
fn rejected_starttls_keeps_reply_code() {
    let (port, handle) = spawn_mock_server(
        "220 mock.smtp.test ESMTP\r\n",
        vec![
            ("EHLO", "250-mock.example\r\n250 STARTTLS\r\n"),
            ("STARTTLS", "454 4.7.0 TLS not available\r\n"),
            ("QUIT", "221 2.0.0 Bye\r\n"),
        ],
    );

    let conversation = analyzer(options(port)).crawl(LOCALHOST);
    handle.join().expect("server thread");

    assert!(conversation.connect_ok);
    assert_eq!(conversation.start_tls_reply_code, Some(454));
    assert!(!conversation.start_tls_ok);
}

#[test]
fn falls_back_to_helo_when_ehlo_is_rejected() {
    let (port, handle) = spawn_mock_server(
        "220 old.smtp.test\r\n",
        vec![
            ("EHLO", "502 5.5.2 Command not recognized\r\n"),
            ("HELO crawler.test", "250 old.smtp.test\r\n"),
            ("QUIT", "221\r\n"),
        ],
    );

    let conversation = analyzer(options(port)).crawl(LOCALHOST);
    handle.join().expect("server thread");

    assert!(conversation.connect_ok);
    assert!(conversation.supported_extensions.is_empty());
    assert_eq!(conversation.start_tls_reply_code, None);
}

#[test]
fn negative_greeting_is_an_unexpected_reply() {
    let (port, handle) = spawn_mock_server(
        "554 5.7.1 No SMTP service here\r\n",
        vec![("QUIT", "221 Bye\r\n")],
    );

    let conversation = analyzer(options(port)).crawl(LOCALHOST);
    handle.join().expect("server thread");

    assert!(!conversation.connect_ok);
    assert_eq!(conversation.error_kind, Some(ErrorKind::UnexpectedReplyCode));
    assert_eq!(conversation.banner, None);
    assert_eq!(conversation.connect_reply_code, None);
    assert!(
        conversation
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("554")),
        "{conversation:?}"
    );
}

#[test]
fn garbage_greeting_is_malformed() {
    let (port, handle) = spawn_mock_server("hello there\r\n", Vec::new());

    let conversation = analyzer(options(port)).crawl(LOCALHOST);
    handle.join().expect("server thread");

    assert!(!conversation.connect_ok);
    assert_eq!(conversation.error_kind, Some(ErrorKind::MalformedResponse));
}

#[test]
fn silent_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let handle = thread::spawn(move || {
        if let Ok((stream, _)) = listener.accept() {
            thread::sleep(Duration::from_millis(800));
            drop(stream);
        }
    });

    let probe_options = ProbeOptions {
        read_timeout: Duration::from_millis(200),
        ..options(port)
    };
    let conversation = analyzer(probe_options).crawl(LOCALHOST);
    handle.join().expect("server thread");

    assert!(!conversation.connect_ok);
    assert_eq!(conversation.error_kind, Some(ErrorKind::ReadTimeout));
    assert_eq!(conversation.start_tls_reply_code, None);
}

#[test]
fn slow_drip_greeting_hits_the_reply_deadline() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let handle = thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            for byte in b"220 mock.smtp.test ESMTP slowly ready\r\n" {
                if stream.write_all(&[*byte]).is_err() {
                    break;
                }
                thread::sleep(Duration::from_millis(50));
            }
        }
    });

    let probe_options = ProbeOptions {
        read_timeout: Duration::from_millis(300),
        ..options(port)
    };
    let started = Instant::now();
    let conversation = analyzer(probe_options).crawl(LOCALHOST);
    let elapsed = started.elapsed();
    handle.join().expect("server thread");

    assert!(elapsed < Duration::from_millis(1500), "took {elapsed:?}");
    assert!(!conversation.connect_ok);
    assert_eq!(conversation.error_kind, Some(ErrorKind::ReadTimeout));
    assert_eq!(conversation.banner, None);
}

#[test]
fn closed_port_is_connection_refused() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };

    let conversation = analyzer(options(port)).crawl(LOCALHOST);

    assert!(!conversation.connect_ok);
    assert_eq!(conversation.error_kind, Some(ErrorKind::ConnectionRefused));
    assert_eq!(conversation.banner, None);
}

#[test]
fn aborted_tls_handshake_is_reported() {
    let (port, handle) = spawn_mock_server(
        "220 mock.smtp.test ESMTP\r\n",
        vec![
            ("EHLO", "250-mock.example\r\n250 STARTTLS\r\n"),
            ("STARTTLS", "220 2.0.0 Ready to start TLS\r\n"),
        ],
    );

    let probe_options = ProbeOptions {
        attempt_tls_handshake: true,
        ..options(port)
    };
    let conversation = analyzer(probe_options).crawl(LOCALHOST);
    handle.join().expect("server thread");

    assert!(!conversation.connect_ok);
    assert_eq!(conversation.error_kind, Some(ErrorKind::TlsHandshakeFailed));
    assert_eq!(conversation.start_tls_reply_code, None);
}
