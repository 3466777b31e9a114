use anyhow::{Context, Result};
#[cfg(not(all(feature = "with-serde", feature = "with-csv")))]
use anyhow::bail;

use smtp_crawler::SmtpVisit;
#[cfg(feature = "with-csv")]
use smtp_crawler::{SmtpConversation, SmtpHost};

use crate::args::{Cli, Format};

pub fn write_reports(visits: &[SmtpVisit], cli: &Cli) -> Result<()> {
    match cli.format {
        Format::Human => write_human(visits, cli),
        Format::Json => write_json(visits, cli),
        Format::Ndjson => write_ndjson(visits, cli),
        Format::Csv => write_csv(visits, cli),
    }
}

fn write_human(visits: &[SmtpVisit], cli: &Cli) -> Result<()> {
    if let Some(path) = &cli.out {
        let report: String = visits.iter().map(|visit| format!("{visit}\n")).collect();
        write_all_atomically(path, report.as_bytes())?;
    } else {
        for visit in visits {
            println!("{visit}");
        }
    }
    Ok(())
}

#[cfg(feature = "with-serde")]
fn write_json(visits: &[SmtpVisit], cli: &Cli) -> Result<()> {
    let s = serde_json::to_string_pretty(visits)?;
    if let Some(path) = &cli.out {
        write_all_atomically(path, s.as_bytes())?;
    } else {
        println!("{s}");
    }
    Ok(())
}

#[cfg(not(feature = "with-serde"))]
fn write_json(_: &[SmtpVisit], _: &Cli) -> Result<()> {
    bail!("format=json requires the 'with-serde' feature")
}

#[cfg(feature = "with-serde")]
fn write_ndjson(visits: &[SmtpVisit], cli: &Cli) -> Result<()> {
    if let Some(path) = &cli.out {
        let mut buf = Vec::new();
        for visit in visits {
            let line = serde_json::to_string(visit)?;
            buf.extend_from_slice(line.as_bytes());
            buf.push(b'\n');
        }
        write_all_atomically(path, &buf)?;
    } else {
        for visit in visits {
            println!("{}", serde_json::to_string(visit)?);
        }
    }
    Ok(())
}

#[cfg(not(feature = "with-serde"))]
fn write_ndjson(_: &[SmtpVisit], _: &Cli) -> Result<()> {
    bail!("format=ndjson requires the 'with-serde' feature")
}

#[cfg(feature = "with-csv")]
const CSV_HEADER: [&str; 16] = [
    "visit_id",
    "domain_name",
    "crawl_status",
    "dns_error",
    "hostname",
    "priority",
    "from_mx",
    "ip",
    "connect_ok",
    "connect_reply_code",
    "connection_time_ms",
    "start_tls_reply_code",
    "start_tls_ok",
    "software",
    "extensions",
    "error_kind",
];

#[cfg(feature = "with-csv")]
fn write_csv(visits: &[SmtpVisit], cli: &Cli) -> Result<()> {
    if let Some(path) = &cli.out {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        write_csv_rows(&mut wtr, visits)?;
        let data = wtr.into_inner()?;
        write_all_atomically(path, &data)?;
    } else {
        let mut wtr = csv::Writer::from_writer(std::io::stdout());
        write_csv_rows(&mut wtr, visits)?;
        wtr.flush()?;
    }
    Ok(())
}

#[cfg(not(feature = "with-csv"))]
fn write_csv(_: &[SmtpVisit], _: &Cli) -> Result<()> {
    bail!("format=csv requires the 'with-csv' feature")
}

/// One row per conversation. Hosts without conversations and visits without
/// hosts still get a row so that every domain shows up.
#[cfg(feature = "with-csv")]
fn write_csv_rows<W: std::io::Write>(wtr: &mut csv::Writer<W>, visits: &[SmtpVisit]) -> Result<()> {
    wtr.write_record(CSV_HEADER)?;
    for visit in visits {
        if visit.hosts.is_empty() {
            wtr.write_record(csv_record(visit, None, None))?;
        }
        for host in &visit.hosts {
            if host.conversations.is_empty() {
                wtr.write_record(csv_record(visit, Some(host), None))?;
            }
            for conversation in &host.conversations {
                wtr.write_record(csv_record(visit, Some(host), Some(conversation)))?;
            }
        }
    }
    Ok(())
}

#[cfg(feature = "with-csv")]
fn csv_record(
    visit: &SmtpVisit,
    host: Option<&SmtpHost>,
    conversation: Option<&SmtpConversation>,
) -> Vec<String> {
    let mut record = vec![
        visit.visit_id.clone(),
        visit.domain_name.clone(),
        visit.crawl_status.to_string(),
        visit.dns_error.clone().unwrap_or_default(),
    ];
    match host {
        Some(host) => record.extend([
            host.hostname.clone(),
            host.priority.to_string(),
            host.from_mx.to_string(),
        ]),
        None => record.extend(std::iter::repeat_n(String::new(), 3)),
    }
    match conversation {
        Some(c) => record.extend([
            c.ip.to_string(),
            c.connect_ok.to_string(),
            opt_to_string(c.connect_reply_code),
            c.connection_time_ms.to_string(),
            opt_to_string(c.start_tls_reply_code),
            c.start_tls_ok.to_string(),
            c.software.clone().unwrap_or_default(),
            c.supported_extensions
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join("|"),
            c.error_kind.map(|k| k.to_string()).unwrap_or_default(),
        ]),
        None => record.extend(std::iter::repeat_n(String::new(), 9)),
    }
    record
}

#[cfg(feature = "with-csv")]
fn opt_to_string<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn write_all_atomically(path: &str, bytes: &[u8]) -> Result<()> {
    use std::io::Write;

    let tmp = format!("{path}.tmp");
    {
        let mut f = std::fs::File::create(&tmp).with_context(|| format!("create {tmp}"))?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp, path).with_context(|| format!("rename {tmp} -> {path}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn human_report_goes_to_out_file() {
        let path = std::env::temp_dir().join(format!("smtp-crawler-{}.txt", std::process::id()));
        let path_str = path.to_string_lossy().into_owned();
        let cli = Cli::try_parse_from(["smtp-crawler", "--out", path_str.as_str(), "example.org"])
            .expect("args");
        let visit = SmtpVisit::new("id-123", "example.org");

        write_reports(std::slice::from_ref(&visit), &cli).expect("write");

        let written = std::fs::read_to_string(&path).expect("report file");
        std::fs::remove_file(&path).ok();
        assert_eq!(written, format!("{visit}\n"));
        assert!(written.starts_with("visit id-123 example.org"));
    }
}
