mod args;
mod output;

use std::io::{self, BufRead};
use std::sync::Arc;

use anyhow::{Context, Result};
use smtp_crawler::metrics::{self as counters, InMemoryMetrics};
use smtp_crawler::{MemoryRepository, SmtpCrawler, VisitRequest};
use tracing_subscriber::EnvFilter;

use crate::args::Cli;
use crate::output::write_reports;

fn init_tracing(verbose: bool) {
    let default = if verbose { "smtp_crawler=debug" } else { "smtp_crawler=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn read_domains(cli: &Cli) -> Result<Vec<String>> {
    let mut domains: Vec<String> = cli.domains.clone();
    if cli.stdin {
        for line in io::stdin().lock().lines() {
            let line = line.context("read stdin")?;
            let domain = line.trim();
            if !domain.is_empty() && !domain.starts_with('#') {
                domains.push(domain.to_string());
            }
        }
    }
    Ok(domains)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let domains = read_domains(&cli)?;
    if domains.is_empty() {
        Cli::clap_command().print_help()?;
        println!();
        return Ok(());
    }
    cli.check_visit_id(&domains)?;

    let config = cli.crawler_config()?;
    let metrics = Arc::new(InMemoryMetrics::new());
    let repository = Arc::new(MemoryRepository::new());
    let crawler = SmtpCrawler::from_config(&config, metrics.clone(), repository)
        .context("set up crawler")?;
    crawler.create_tables().context("create tables")?;

    let mut visits = Vec::with_capacity(domains.len());
    for domain in &domains {
        let request = match &cli.visit_id {
            Some(visit_id) => VisitRequest::new(visit_id.clone(), domain.clone()),
            None => VisitRequest::random(domain.clone()),
        };
        let collected = crawler.collect_data(&request);
        crawler.save(&collected).context("store visit")?;
        visits.extend(collected);
    }

    write_reports(&visits, &cli)?;

    tracing::info!(
        visits = visits.len(),
        conversations_ok = metrics.counter(counters::CONVERSATION_SUCCESS),
        conversations_failed = metrics.counter(counters::CONVERSATION_FAILURE),
        cache_hits = metrics.counter(counters::CACHE_HITS),
        "crawl finished"
    );
    Ok(())
}
