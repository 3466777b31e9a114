//! Best-effort MTA identification from the greeting banner.

use once_cell::sync::Lazy;
use regex::Regex;

struct Signature {
    name: &'static str,
    pattern: Regex,
}

static SIGNATURES: Lazy<Vec<Signature>> = Lazy::new(|| {
    [
        ("Microsoft Exchange", r"(?i)Microsoft ESMTP MAIL Service(?:, Version: (\d+(?:\.\d+)+))?"),
        ("Exim", r"(?i)\bExim\b(?:\s+(\d+(?:\.\d+)+))?"),
        ("Sendmail", r"(?i)\bSendmail\b(?:\s+(\d+(?:\.\d+)+))?"),
        ("Postfix", r"(?i)\bPostfix\b"),
        ("OpenSMTPD", r"(?i)\bOpenSMTPD\b"),
        ("Haraka", r"(?i)\bHaraka\b(?:[/ ](\d+(?:\.\d+)+))?"),
        ("Google", r"(?i)\bgsmtp\b|mx\.google\.com"),
        ("qmail", r"(?i)\bqmail\b"),
    ]
    .into_iter()
    .map(|(name, pattern)| Signature {
        name,
        pattern: Regex::new(pattern).expect("software signature regex failed to compile. This is a bug."),
    })
    .collect()
});

/// Returns `(product, version)` for the first signature matching `banner`.
pub(crate) fn detect(banner: &str) -> Option<(String, Option<String>)> {
    SIGNATURES.iter().find_map(|signature| {
        let captures = signature.pattern.captures(banner)?;
        let version = captures.get(1).map(|m| m.as_str().to_string());
        Some((signature.name.to_string(), version))
    })
}

#[cfg(test)]
mod tests {
    use super::detect;

    #[test]
    fn postfix_has_no_version() {
        assert_eq!(
            detect("220 mail.example.be ESMTP Postfix (Debian/GNU)"),
            Some(("Postfix".to_string(), None))
        );
    }

    #[test]
    fn exim_version_is_captured() {
        assert_eq!(
            detect("220 mx.example.org ESMTP Exim 4.94.2 Mon, 01 Jan 2024 10:00:00 +0000"),
            Some(("Exim".to_string(), Some("4.94.2".to_string())))
        );
    }

    #[test]
    fn exchange_version_is_captured() {
        let banner = "220 EX01.corp.local Microsoft ESMTP MAIL Service, Version: 15.1.2507.6 ready";
        assert_eq!(
            detect(banner),
            Some((
                "Microsoft Exchange".to_string(),
                Some("15.1.2507.6".to_string())
            ))
        );
    }

    #[test]
    fn google_frontends_are_recognised() {
        let found = detect("220 mx.google.com ESMTP a1si123 - gsmtp").map(|(name, _)| name);
        assert_eq!(found.as_deref(), Some("Google"));
    }

    #[test]
    fn unknown_banner_yields_none() {
        assert_eq!(detect("220 HELLO SMTP"), None);
    }
}
