//! Persistence contract for visits.
//!
//! A visit is stored as three relations: `smtp_visit`, `smtp_host` and
//! `smtp_conversation`. [`MemoryRepository`] keeps them in process.

mod memory;

use thiserror::Error;

use crate::visit::SmtpVisit;

pub use memory::MemoryRepository;

pub const VISIT_TABLE: &str = "smtp_visit";
pub const HOST_TABLE: &str = "smtp_host";
pub const CONVERSATION_TABLE: &str = "smtp_conversation";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("relation {table} does not exist, create the tables first")]
    MissingTable { table: &'static str },
    #[error("visit {visit_id} is already stored")]
    DuplicateVisit { visit_id: String },
}

impl RepositoryError {
    pub(crate) fn missing_table(table: &'static str) -> Self {
        Self::MissingTable { table }
    }

    pub(crate) fn duplicate_visit(visit_id: &str) -> Self {
        Self::DuplicateVisit {
            visit_id: visit_id.to_string(),
        }
    }
}

pub trait SmtpRepository: Send + Sync {
    /// Creates the relations if they do not exist yet. Calling it again is a
    /// no-op.
    fn create_tables(&self) -> Result<(), RepositoryError>;

    /// Stores a visit with its hosts and conversations. Nothing is written
    /// when an error is returned.
    fn save_visit(&self, visit: &SmtpVisit) -> Result<(), RepositoryError>;

    /// Stores `visits` in order, stopping at the first error. Visits saved
    /// before the failing one stay stored; [`MemoryRepository`] overrides this
    /// to write the whole batch or nothing.
    fn save_visits(&self, visits: &[SmtpVisit]) -> Result<(), RepositoryError> {
        for visit in visits {
            self.save_visit(visit)?;
        }
        Ok(())
    }

    /// Visits stored under `visit_id`; empty when there are none.
    fn find(&self, visit_id: &str) -> Result<Vec<SmtpVisit>, RepositoryError>;
}
