use std::collections::HashSet;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{CONVERSATION_TABLE, HOST_TABLE, RepositoryError, SmtpRepository, VISIT_TABLE};
use crate::smtp::{ErrorKind, SmtpConversation};
use crate::visit::{CrawlStatus, SmtpHost, SmtpVisit};

#[derive(Debug, Clone)]
struct VisitRow {
    visit_id: String,
    domain_name: String,
    timestamp: DateTime<Utc>,
    crawl_status: CrawlStatus,
    dns_error: Option<String>,
}

#[derive(Debug, Clone)]
struct HostRow {
    id: u64,
    visit_id: String,
    hostname: String,
    priority: u16,
    from_mx: bool,
}

#[derive(Debug, Clone)]
struct ConversationRow {
    id: u64,
    host_id: u64,
    ip: IpAddr,
    banner: Option<String>,
    connect_ok: bool,
    connect_reply_code: Option<u16>,
    connection_time_ms: u64,
    start_tls_ok: bool,
    start_tls_reply_code: Option<u16>,
    supported_extensions: Vec<String>,
    software: Option<String>,
    software_version: Option<String>,
    error_kind: Option<ErrorKind>,
    error_message: Option<String>,
    timestamp: DateTime<Utc>,
}

impl ConversationRow {
    fn new(id: u64, host_id: u64, conversation: &SmtpConversation) -> Self {
        Self {
            id,
            host_id,
            ip: conversation.ip,
            banner: conversation.banner.clone(),
            connect_ok: conversation.connect_ok,
            connect_reply_code: conversation.connect_reply_code,
            connection_time_ms: conversation.connection_time_ms,
            start_tls_ok: conversation.start_tls_ok,
            start_tls_reply_code: conversation.start_tls_reply_code,
            supported_extensions: conversation.supported_extensions.iter().cloned().collect(),
            software: conversation.software.clone(),
            software_version: conversation.software_version.clone(),
            error_kind: conversation.error_kind,
            error_message: conversation.error_message.clone(),
            timestamp: conversation.timestamp,
        }
    }

    fn to_conversation(&self) -> SmtpConversation {
        SmtpConversation {
            ip: self.ip,
            banner: self.banner.clone(),
            connect_ok: self.connect_ok,
            connect_reply_code: self.connect_reply_code,
            connection_time_ms: self.connection_time_ms,
            start_tls_ok: self.start_tls_ok,
            start_tls_reply_code: self.start_tls_reply_code,
            supported_extensions: self.supported_extensions.iter().cloned().collect(),
            software: self.software.clone(),
            software_version: self.software_version.clone(),
            error_kind: self.error_kind,
            error_message: self.error_message.clone(),
            timestamp: self.timestamp,
        }
    }
}

#[derive(Debug, Default)]
struct Tables {
    visits: Vec<VisitRow>,
    hosts: Vec<HostRow>,
    conversations: Vec<ConversationRow>,
    next_id: u64,
}

impl Tables {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn contains_visit(&self, visit_id: &str) -> bool {
        self.visits.iter().any(|row| row.visit_id == visit_id)
    }

    fn insert(&mut self, visit: &SmtpVisit) {
        self.visits.push(VisitRow {
            visit_id: visit.visit_id.clone(),
            domain_name: visit.domain_name.clone(),
            timestamp: visit.timestamp,
            crawl_status: visit.crawl_status,
            dns_error: visit.dns_error.clone(),
        });
        for host in &visit.hosts {
            let host_id = self.next_id();
            self.hosts.push(HostRow {
                id: host_id,
                visit_id: visit.visit_id.clone(),
                hostname: host.hostname.clone(),
                priority: host.priority,
                from_mx: host.from_mx,
            });
            for conversation in &host.conversations {
                let id = self.next_id();
                self.conversations
                    .push(ConversationRow::new(id, host_id, conversation));
            }
        }
        tracing::debug!(
            visit_id = %visit.visit_id,
            hosts = visit.hosts.len(),
            conversations = visit.num_conversations(),
            "visit saved"
        );
    }

    /// Conversations of `host_id` in insertion order.
    fn conversations_of(&self, host_id: u64) -> Vec<SmtpConversation> {
        let mut rows: Vec<&ConversationRow> = self
            .conversations
            .iter()
            .filter(|row| row.host_id == host_id)
            .collect();
        rows.sort_by_key(|row| row.id);
        rows.into_iter().map(ConversationRow::to_conversation).collect()
    }
}

/// [`SmtpRepository`] holding the three relations in memory.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    tables: Mutex<Option<Tables>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relations created so far.
    pub fn table_names(&self) -> Vec<&'static str> {
        if self.tables.lock().is_some() {
            vec![VISIT_TABLE, HOST_TABLE, CONVERSATION_TABLE]
        } else {
            Vec::new()
        }
    }

    pub fn count_visits(&self) -> usize {
        self.tables.lock().as_ref().map_or(0, |tables| tables.visits.len())
    }
}

impl SmtpRepository for MemoryRepository {
    fn create_tables(&self) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock();
        if tables.is_none() {
            tracing::debug!("creating SMTP relations");
            *tables = Some(Tables::default());
        }
        Ok(())
    }

    fn save_visit(&self, visit: &SmtpVisit) -> Result<(), RepositoryError> {
        self.save_visits(std::slice::from_ref(visit))
    }

    /// All or nothing: the batch is checked against stored visits and
    /// against itself before any row is written.
    fn save_visits(&self, visits: &[SmtpVisit]) -> Result<(), RepositoryError> {
        let mut guard = self.tables.lock();
        let tables = guard
            .as_mut()
            .ok_or_else(|| RepositoryError::missing_table(VISIT_TABLE))?;
        let mut batch = HashSet::with_capacity(visits.len());
        for visit in visits {
            if tables.contains_visit(&visit.visit_id) || !batch.insert(visit.visit_id.as_str()) {
                return Err(RepositoryError::duplicate_visit(&visit.visit_id));
            }
        }
        for visit in visits {
            tables.insert(visit);
        }
        Ok(())
    }

    fn find(&self, visit_id: &str) -> Result<Vec<SmtpVisit>, RepositoryError> {
        let guard = self.tables.lock();
        let tables = guard
            .as_ref()
            .ok_or_else(|| RepositoryError::missing_table(VISIT_TABLE))?;

        let visits = tables
            .visits
            .iter()
            .filter(|row| row.visit_id == visit_id)
            .map(|row| SmtpVisit {
                visit_id: row.visit_id.clone(),
                domain_name: row.domain_name.clone(),
                timestamp: row.timestamp,
                crawl_status: row.crawl_status,
                dns_error: row.dns_error.clone(),
                hosts: tables
                    .hosts
                    .iter()
                    .filter(|host| host.visit_id == row.visit_id)
                    .map(|host| SmtpHost {
                        hostname: host.hostname.clone(),
                        priority: host.priority,
                        from_mx: host.from_mx,
                        conversations: tables.conversations_of(host.id),
                    })
                    .collect(),
            })
            .collect();
        Ok(visits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn visit(visit_id: &str) -> SmtpVisit {
        let mut ok = SmtpConversation::new(IpAddr::V4(Ipv4Addr::new(72, 20, 30, 40)));
        ok.connect_ok = true;
        ok.banner = Some("220 HELLO SMTP".to_string());
        ok.connect_reply_code = Some(220);
        ok.connection_time_ms = 123;
        ok.start_tls_reply_code = Some(220);
        ok.start_tls_ok = true;
        ok.supported_extensions = ["PIPELINING", "SIZE 1000", "STARTTLS"]
            .into_iter()
            .map(String::from)
            .collect();
        ok.software = Some("Postfix".to_string());

        let failed = SmtpConversation::failed(
            IpAddr::V6(Ipv6Addr::LOCALHOST),
            ErrorKind::ConnectTimeout,
            "connection to [::1]:25 failed: timed out",
        );

        let mut mx = SmtpHost::new("mx.example.org", 10, true);
        mx.conversations = vec![ok, failed];
        let empty = SmtpHost::new("backup.example.org", 20, true);

        let mut visit = SmtpVisit::new(visit_id, "example.org");
        visit.hosts = vec![mx, empty];
        visit
    }

    #[test]
    fn create_tables_is_idempotent() {
        let repository = MemoryRepository::new();
        assert!(repository.table_names().is_empty());
        repository.create_tables().expect("first");
        let first = repository.table_names();
        repository.create_tables().expect("second");
        assert_eq!(repository.table_names(), first);
        assert_eq!(first, vec!["smtp_visit", "smtp_host", "smtp_conversation"]);
    }

    #[test]
    fn create_tables_keeps_existing_rows() {
        let repository = MemoryRepository::new();
        repository.create_tables().expect("tables");
        repository.save_visit(&visit("v-1")).expect("save");
        repository.create_tables().expect("tables again");
        assert_eq!(repository.count_visits(), 1);
    }

    #[test]
    fn saving_without_tables_fails() {
        let repository = MemoryRepository::new();
        assert_eq!(
            repository.save_visit(&visit("v-1")),
            Err(RepositoryError::MissingTable { table: "smtp_visit" })
        );
        assert!(repository.find("v-1").is_err());
    }

    #[test]
    fn round_trip_keeps_nested_fields() {
        let repository = MemoryRepository::new();
        repository.create_tables().expect("tables");
        let original = visit("v-1");
        repository.save_visit(&original).expect("save");

        assert_eq!(repository.find("v-1").expect("find"), vec![original]);
    }

    #[test]
    fn unknown_visit_yields_nothing() {
        let repository = MemoryRepository::new();
        repository.create_tables().expect("tables");
        repository.save_visit(&visit("v-1")).expect("save");
        assert!(repository.find("v-2").expect("find").is_empty());
    }

    #[test]
    fn duplicate_visit_is_rejected_without_partial_writes() {
        let repository = MemoryRepository::new();
        repository.create_tables().expect("tables");
        repository.save_visit(&visit("v-1")).expect("save");

        let mut again = visit("v-1");
        again.domain_name = "other.example".to_string();
        assert_eq!(
            repository.save_visit(&again),
            Err(RepositoryError::DuplicateVisit {
                visit_id: "v-1".to_string()
            })
        );
        let stored = repository.find("v-1").expect("find");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].domain_name, "example.org");
        assert_eq!(stored[0].num_conversations(), 2);
    }

    #[test]
    fn batch_with_duplicate_writes_nothing() {
        let repository = MemoryRepository::new();
        repository.create_tables().expect("tables");
        let result = repository.save_visits(&[visit("a"), visit("a"), visit("b")]);
        assert!(matches!(result, Err(RepositoryError::DuplicateVisit { .. })));
        assert!(repository.find("a").expect("find").is_empty());
        assert!(repository.find("b").expect("find").is_empty());
        assert_eq!(repository.count_visits(), 0);

        repository
            .save_visits(&[visit("a"), visit("b")])
            .expect("retry whole batch");
        assert_eq!(repository.count_visits(), 2);
    }

    #[test]
    fn batch_clashing_with_stored_visit_writes_nothing() {
        let repository = MemoryRepository::new();
        repository.create_tables().expect("tables");
        repository.save_visit(&visit("a")).expect("save");

        let result = repository.save_visits(&[visit("b"), visit("a")]);
        assert_eq!(result, Err(RepositoryError::duplicate_visit("a")));
        assert!(repository.find("b").expect("find").is_empty());
        assert_eq!(repository.count_visits(), 1);
    }

    #[test]
    fn conversations_keep_insertion_order() {
        let repository = MemoryRepository::new();
        repository.create_tables().expect("tables");
        let original = visit("v-1");
        repository.save_visit(&original).expect("save");

        let stored = repository.find("v-1").expect("find");
        let ips: Vec<IpAddr> = stored[0].conversations().map(|(_, c)| c.ip).collect();
        let expected: Vec<IpAddr> = original.conversations().map(|(_, c)| c.ip).collect();
        assert_eq!(ips, expected);
    }
}
