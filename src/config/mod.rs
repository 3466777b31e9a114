//! Crawler configuration: compiled defaults overlaid by an optional TOML
//! file. The CLI applies its own flags on top.

mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::analyzer::AnalyzerOptions;
use crate::cache::CacheOptions;
use crate::mx::DnsOptions;
use crate::smtp::ProbeOptions;

pub use file::ConfigFile;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {source}")]
    Parse {
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: &'static str) -> Self {
        Self::Invalid { field, reason }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlerConfig {
    pub dns: DnsOptions,
    pub smtp: ProbeOptions,
    pub analyzer: AnalyzerOptions,
    pub cache: CacheOptions,
}

impl CrawlerConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(input).map_err(|source| ConfigError::Parse { source })?;
        let mut config = Self::default();
        config.apply(&file);
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&input)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Overlays every value present in `file`.
    pub fn apply(&mut self, file: &ConfigFile) {
        let dns = &file.dns;
        if let Some(ms) = dns.timeout_ms {
            self.dns.timeout = Duration::from_millis(ms);
        }
        if let Some(attempts) = dns.attempts {
            self.dns.attempts = attempts;
        }

        let smtp = &file.smtp;
        if let Some(port) = smtp.port {
            self.smtp.port = port;
        }
        if let Some(helo) = &smtp.helo_domain {
            self.smtp.helo_domain = Some(helo.clone());
        }
        if let Some(ms) = smtp.connect_timeout_ms {
            self.smtp.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = smtp.read_timeout_ms {
            self.smtp.read_timeout = Duration::from_millis(ms);
        }
        if let Some(enabled) = smtp.attempt_start_tls {
            self.smtp.attempt_start_tls = enabled;
        }
        if let Some(enabled) = smtp.attempt_tls_handshake {
            self.smtp.attempt_tls_handshake = enabled;
        }

        let analyzer = &file.analyzer;
        if let Some(size) = analyzer.max_concurrent_ip_probes {
            self.analyzer.max_concurrent_ip_probes = size;
        }
        if let Some(enabled) = analyzer.fallback_to_domain_if_no_mx {
            self.analyzer.fallback_to_domain_if_no_mx = enabled;
        }
        if let Some(limit) = analyzer.max_hosts_to_contact {
            self.analyzer.max_hosts_to_contact = limit;
        }
        if let Some(skip) = analyzer.skip_ipv4 {
            self.analyzer.skip_ipv4 = skip;
        }
        if let Some(skip) = analyzer.skip_ipv6 {
            self.analyzer.skip_ipv6 = skip;
        }
        if let Some(ms) = analyzer.visit_deadline_ms {
            self.analyzer.visit_deadline = Some(Duration::from_millis(ms));
        }

        if let Some(secs) = file.cache.ttl_secs {
            self.cache.ttl = Some(Duration::from_secs(secs));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.smtp.port == 0 {
            return Err(ConfigError::invalid("smtp.port", "must not be 0"));
        }
        if self.smtp.connect_timeout.is_zero() {
            return Err(ConfigError::invalid("smtp.connect_timeout_ms", "must be positive"));
        }
        if self.smtp.read_timeout.is_zero() {
            return Err(ConfigError::invalid("smtp.read_timeout_ms", "must be positive"));
        }
        if self.dns.timeout.is_zero() {
            return Err(ConfigError::invalid("dns.timeout_ms", "must be positive"));
        }
        if self.analyzer.max_hosts_to_contact == 0 {
            return Err(ConfigError::invalid("analyzer.max_hosts_to_contact", "must be at least 1"));
        }
        if self.analyzer.skip_ipv4 && self.analyzer.skip_ipv6 {
            return Err(ConfigError::invalid(
                "analyzer.skip_ipv4",
                "cannot skip both address families",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_keeps_defaults() {
        let config = CrawlerConfig::from_toml_str("").expect("empty config");
        assert_eq!(config, CrawlerConfig::default());
        assert_eq!(config.smtp.port, 25);
        assert_eq!(config.analyzer.max_concurrent_ip_probes, 4);
        assert!(config.analyzer.fallback_to_domain_if_no_mx);
        assert_eq!(config.cache.ttl, None);
    }

    #[test]
    fn sections_override_defaults() {
        let config = CrawlerConfig::from_toml_str(
            r#"
            [dns]
            timeout_ms = 1500
            attempts = 3

            [smtp]
            port = 2525
            helo_domain = "crawler.example.be"
            read_timeout_ms = 4000
            attempt_tls_handshake = true

            [analyzer]
            max_concurrent_ip_probes = 8
            fallback_to_domain_if_no_mx = false
            skip_ipv6 = true
            visit_deadline_ms = 60000

            [cache]
            ttl_secs = 3600
            "#,
        )
        .expect("valid config");

        assert_eq!(config.dns.timeout, Duration::from_millis(1500));
        assert_eq!(config.dns.attempts, 3);
        assert_eq!(config.smtp.port, 2525);
        assert_eq!(config.smtp.helo_name(), "crawler.example.be");
        assert_eq!(config.smtp.read_timeout, Duration::from_secs(4));
        assert_eq!(config.smtp.connect_timeout, Duration::from_secs(10));
        assert!(config.smtp.attempt_start_tls);
        assert!(config.smtp.tls_handshake_enabled());
        assert_eq!(config.analyzer.max_concurrent_ip_probes, 8);
        assert!(!config.analyzer.fallback_to_domain_if_no_mx);
        assert!(config.analyzer.skip_ipv6);
        assert_eq!(config.analyzer.visit_deadline, Some(Duration::from_secs(60)));
        assert_eq!(config.cache.ttl, Some(Duration::from_secs(3600)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = CrawlerConfig::from_toml_str("[smtp]\nsender = \"x@example.org\"\n")
            .expect_err("unknown key");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn zero_port_is_invalid() {
        let err = CrawlerConfig::from_toml_str("[smtp]\nport = 0\n").expect_err("port 0");
        assert!(matches!(err, ConfigError::Invalid { field: "smtp.port", .. }));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = CrawlerConfig::load("/nonexistent/smtp-crawler.toml").expect_err("missing");
        assert!(err.to_string().contains("/nonexistent/smtp-crawler.toml"));
    }
}
