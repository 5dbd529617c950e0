//! Storage trait and error types

use crate::storage::{
    BaselineRecord, CrawlJobRecord, CrawlPageRecord, DiffEvidenceRecord, SiteRecord,
};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Relational store contract used by the crawl pipeline.
///
/// Each operation is an independent insert or lookup; no cross-row
/// transactions are required by the core.
pub trait Storage: Send {
    // ===== Sites =====

    /// Inserts or replaces a site row (used by seeders and tests)
    fn upsert_site(&mut self, site: &SiteRecord) -> StorageResult<()>;

    /// Lists enabled sites, optionally restricted to one site or customer
    fn list_enabled_sites(
        &self,
        site_id: Option<i64>,
        customer_id: Option<i64>,
    ) -> StorageResult<Vec<SiteRecord>>;

    // ===== Jobs =====

    fn create_job(&mut self, job: &CrawlJobRecord) -> StorageResult<()>;

    fn get_job(&self, job_id: &str) -> StorageResult<Option<CrawlJobRecord>>;

    /// Marks a job completed with its final page count
    fn complete_job(&mut self, job_id: &str, pages_crawled: u64) -> StorageResult<()>;

    /// Marks a job failed with a reason
    fn fail_job(&mut self, job_id: &str, error_msg: &str, pages_crawled: u64) -> StorageResult<()>;

    // ===== Crawl pages =====

    /// Appends per-fetch metadata; idempotent on `(job_id, url)`
    fn insert_crawl_page(&mut self, page: &CrawlPageRecord) -> StorageResult<()>;

    fn count_crawl_pages(&self, job_id: &str) -> StorageResult<u64>;

    // ===== Baselines =====

    /// Inserts or refreshes the baseline row for `(site_id, url,
    /// norm_version)`; snapshot files themselves are immutable, the row
    /// follows the newest revision
    fn upsert_baseline(&mut self, baseline: &BaselineRecord) -> StorageResult<i64>;

    fn get_baseline(
        &self,
        site_id: i64,
        url: &str,
        norm_version: &str,
    ) -> StorageResult<Option<BaselineRecord>>;

    fn count_baselines(&self, site_id: i64) -> StorageResult<u64>;

    // ===== Verdict evidence =====

    fn insert_diff_evidence(&mut self, evidence: &DiffEvidenceRecord) -> StorageResult<()>;

    fn count_diff_evidence(&self, site_id: i64) -> StorageResult<u64>;

    fn count_diff_evidence_by_status(&self, site_id: i64, status: &str) -> StorageResult<u64>;
}
