//! Entry point used by the scheduling layer: crawl a [`VisitRequest`] and
//! store or fetch the resulting visits.

use std::sync::Arc;

use thiserror::Error;

use crate::analyzer::SmtpAnalyzer;
use crate::cache::SmtpConversationCache;
use crate::config::CrawlerConfig;
use crate::metrics::MetricsSink;
use crate::mx::{self, DnsMxFinder};
use crate::repository::{RepositoryError, SmtpRepository};
use crate::smtp::{ProbeError, SmtpIpAnalyzer};
use crate::visit::{SmtpVisit, VisitRequest};

#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("storage failed: {0}")]
    Repository(#[from] RepositoryError),
    #[error("DNS resolver setup failed: {0}")]
    Resolver(#[from] mx::Error),
    #[error("SMTP probe setup failed: {0}")]
    Probe(#[from] ProbeError),
}

pub struct SmtpCrawler {
    analyzer: SmtpAnalyzer,
    repository: Arc<dyn SmtpRepository>,
}

impl std::fmt::Debug for SmtpCrawler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpCrawler")
            .field("analyzer", &self.analyzer)
            .finish_non_exhaustive()
    }
}

impl SmtpCrawler {
    pub fn new(analyzer: SmtpAnalyzer, repository: Arc<dyn SmtpRepository>) -> Self {
        Self {
            analyzer,
            repository,
        }
    }

    /// Wires the production components (system DNS resolver, blocking SMTP
    /// probe, shared conversation cache) from `config`.
    pub fn from_config(
        config: &CrawlerConfig,
        metrics: Arc<dyn MetricsSink>,
        repository: Arc<dyn SmtpRepository>,
    ) -> Result<Self, CrawlerError> {
        let mx_finder = DnsMxFinder::new(&config.dns)?;
        let ip_analyzer = SmtpIpAnalyzer::new(config.smtp.clone())?;
        let cache = SmtpConversationCache::with_options(metrics.clone(), config.cache.clone());
        let analyzer = SmtpAnalyzer::new(
            metrics,
            Arc::new(ip_analyzer),
            Arc::new(mx_finder),
            Arc::new(cache),
            config.analyzer.clone(),
        );
        Ok(Self::new(analyzer, repository))
    }

    pub fn create_tables(&self) -> Result<(), CrawlerError> {
        self.repository.create_tables()?;
        Ok(())
    }

    /// Crawls the requested domain. Always yields exactly one visit, carrying
    /// the request's visit id.
    pub fn collect_data(&self, request: &VisitRequest) -> Vec<SmtpVisit> {
        tracing::debug!(visit_id = %request.visit_id, domain = %request.domain_name, "collecting SMTP data");
        let mut visit = self.analyzer.analyze(&request.domain_name);
        visit.visit_id = request.visit_id.clone();
        vec![visit]
    }

    pub fn save(&self, visits: &[SmtpVisit]) -> Result<(), CrawlerError> {
        self.repository.save_visits(visits)?;
        tracing::debug!(count = visits.len(), "visits saved");
        Ok(())
    }

    pub fn find(&self, visit_id: &str) -> Result<Vec<SmtpVisit>, CrawlerError> {
        Ok(self.repository.find(visit_id)?)
    }
}
