//! Storage module for persisting crawl data
//!
//! This module handles all persistence for the crawler:
//! - SQLite schema management and record access
//! - Crawl job and per-page bookkeeping
//! - Baseline rows plus their on-disk snapshot tree
//! - Defacement verdict evidence
//!
//! Callers go through [`DbHandle`], which bounds concurrent storage access
//! and serializes the underlying connection.

mod schema;
mod snapshots;
mod sqlite;
mod traits;

pub use schema::initialize_schema;
pub use snapshots::{PageVersion, SnapshotStore};
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};

/// Lifecycle status of a crawl job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// A monitored site; created and edited externally, read-only to the core
#[derive(Debug, Clone)]
pub struct SiteRecord {
    pub site_id: i64,
    pub customer_id: i64,
    pub url: String,
    pub enabled: bool,
}

/// One crawl of one site
#[derive(Debug, Clone)]
pub struct CrawlJobRecord {
    pub job_id: String,
    pub site_id: i64,
    pub customer_id: i64,
    pub start_url: String,
    pub status: JobStatus,
    pub pages_crawled: u64,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub error_msg: Option<String>,
}

/// Per-fetch metadata appended in CRAWL mode
#[derive(Debug, Clone)]
pub struct CrawlPageRecord {
    pub job_id: String,
    pub site_id: i64,
    pub url: String,
    pub parent_url: Option<String>,
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub response_time_ms: Option<u64>,
    pub fetched_at: String,
}

/// Baseline row pointing at its snapshot on disk
#[derive(Debug, Clone)]
pub struct BaselineRecord {
    pub id: i64,
    pub site_id: i64,
    pub url: String,
    pub html_hash: String,
    pub structural_hash: String,
    pub norm_version: String,
    pub snapshot_path: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Persisted verdict evidence
#[derive(Debug, Clone)]
pub struct DiffEvidenceRecord {
    pub site_id: i64,
    pub url: String,
    pub baseline_hash: String,
    pub observed_hash: String,
    /// JSON document with drifts, indicators and confidence
    pub diff_summary: String,
    pub severity: String,
    pub status: String,
    pub detected_at: String,
}

/// Bounded, serialized access to the relational store.
///
/// A semaphore caps concurrent callers; acquisition times out after the
/// configured `DB_SEMAPHORE` interval, which the site runner treats as the
/// database being unavailable.
pub struct DbHandle {
    storage: Mutex<SqliteStorage>,
    gate: Arc<Semaphore>,
    acquire_timeout: Duration,
}

impl DbHandle {
    pub fn new(storage: SqliteStorage, pool_size: usize, acquire_timeout: Duration) -> Self {
        Self {
            storage: Mutex::new(storage),
            gate: Arc::new(Semaphore::new(pool_size.max(1))),
            acquire_timeout,
        }
    }

    /// Runs one storage operation under the connection gate
    pub async fn run<T, F>(&self, op: F) -> StorageResult<T>
    where
        F: FnOnce(&mut SqliteStorage) -> StorageResult<T>,
    {
        let permit = tokio::time::timeout(self.acquire_timeout, self.gate.clone().acquire_owned())
            .await
            .map_err(|_| {
                StorageError::Unavailable("timed out waiting for a storage slot".to_string())
            })?
            .map_err(|_| StorageError::Unavailable("storage gate closed".to_string()))?;

        let mut storage = self.storage.lock().await;
        let result = op(&mut storage);
        drop(storage);
        drop(permit);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_roundtrip() {
        for status in [JobStatus::Running, JobStatus::Completed, JobStatus::Failed] {
            assert_eq!(
                JobStatus::from_db_string(status.to_db_string()),
                Some(status)
            );
        }
        assert_eq!(JobStatus::from_db_string("paused"), None);
    }

    #[tokio::test]
    async fn test_db_handle_runs_operations() {
        let handle = DbHandle::new(
            SqliteStorage::new_in_memory().unwrap(),
            4,
            Duration::from_secs(1),
        );

        let sites = handle.run(|s| s.list_enabled_sites(None, None)).await.unwrap();
        assert!(sites.is_empty());
    }
}
