use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use smtp_crawler::CrawlerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Human,
    Json,
    Ndjson,
    Csv,
}

#[derive(Parser, Debug)]
#[command(name = "smtp-crawler", version, about = "Probe the SMTP/TLS posture of mail domains")]
pub struct Cli {
    /// domains to crawl
    pub domains: Vec<String>,

    /// read domains from stdin (one per line)
    #[arg(long)]
    pub stdin: bool,

    /// visit id to use (single domain only, random UUIDs otherwise)
    #[arg(long)]
    pub visit_id: Option<String>,

    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// SMTP port to connect to
    #[arg(long)]
    pub port: Option<u16>,

    /// name announced in EHLO/HELO
    #[arg(long)]
    pub helo: Option<String>,

    #[arg(long = "connect-timeout-ms")]
    pub connect_timeout_ms: Option<u64>,

    #[arg(long = "read-timeout-ms")]
    pub read_timeout_ms: Option<u64>,

    /// never send STARTTLS
    #[arg(long = "no-starttls")]
    pub no_starttls: bool,

    /// complete the TLS handshake after STARTTLS
    #[arg(long = "tls-handshake")]
    pub tls_handshake: bool,

    /// do not probe the domain itself when it has no MX records
    #[arg(long = "no-fallback")]
    pub no_fallback: bool,

    /// concurrent IP probes per visit
    #[arg(long = "pool-size")]
    pub pool_size: Option<usize>,

    /// do not probe IPv6 addresses
    #[arg(long = "skip-ipv6")]
    pub skip_ipv6: bool,

    #[arg(long, value_enum, default_value = "human")]
    pub format: Format,

    /// write report to file instead of stdout (per --format)
    #[arg(long)]
    pub out: Option<String>,

    /// debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn clap_command() -> clap::Command {
        <Self as clap::CommandFactory>::command()
    }

    /// Compiled defaults, then `--config`, then the individual flags.
    pub fn crawler_config(&self) -> Result<CrawlerConfig> {
        let mut config = match &self.config {
            Some(path) => CrawlerConfig::load(path)
                .with_context(|| format!("load config {}", path.display()))?,
            None => CrawlerConfig::default(),
        };

        if let Some(port) = self.port {
            config.smtp.port = port;
        }
        if let Some(helo) = &self.helo {
            config.smtp.helo_domain = Some(helo.clone());
        }
        if let Some(ms) = self.connect_timeout_ms {
            config.smtp.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.read_timeout_ms {
            config.smtp.read_timeout = Duration::from_millis(ms);
        }
        if self.no_starttls {
            config.smtp.attempt_start_tls = false;
        }
        if self.tls_handshake {
            config.smtp.attempt_tls_handshake = true;
        }
        if self.no_fallback {
            config.analyzer.fallback_to_domain_if_no_mx = false;
        }
        if let Some(size) = self.pool_size {
            config.analyzer.max_concurrent_ip_probes = size;
        }
        if self.skip_ipv6 {
            config.analyzer.skip_ipv6 = true;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    pub fn check_visit_id(&self, domains: &[String]) -> Result<()> {
        if self.visit_id.is_some() && domains.len() != 1 {
            bail!("--visit-id requires exactly one domain, got {}", domains.len());
        }
        Ok(())
    }
}
