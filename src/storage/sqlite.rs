//! SQLite implementation of the Storage trait

use crate::storage::schema::initialize_schema;
use crate::storage::{
    BaselineRecord, CrawlJobRecord, CrawlPageRecord, DiffEvidenceRecord, JobStatus, SiteRecord,
    Storage, StorageError, StorageResult,
};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens (or creates) the database file and initializes the schema
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for tests)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn row_to_site(row: &rusqlite::Row<'_>) -> rusqlite::Result<SiteRecord> {
    Ok(SiteRecord {
        site_id: row.get(0)?,
        customer_id: row.get(1)?,
        url: row.get(2)?,
        enabled: row.get::<_, i64>(3)? != 0,
    })
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<CrawlJobRecord> {
    Ok(CrawlJobRecord {
        job_id: row.get(0)?,
        site_id: row.get(1)?,
        customer_id: row.get(2)?,
        start_url: row.get(3)?,
        status: JobStatus::from_db_string(&row.get::<_, String>(4)?).unwrap_or(JobStatus::Running),
        pages_crawled: row.get::<_, i64>(5)? as u64,
        started_at: row.get(6)?,
        completed_at: row.get(7)?,
        error_msg: row.get(8)?,
    })
}

fn row_to_baseline(row: &rusqlite::Row<'_>) -> rusqlite::Result<BaselineRecord> {
    Ok(BaselineRecord {
        id: row.get(0)?,
        site_id: row.get(1)?,
        url: row.get(2)?,
        html_hash: row.get(3)?,
        structural_hash: row.get(4)?,
        norm_version: row.get(5)?,
        snapshot_path: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

impl Storage for SqliteStorage {
    fn upsert_site(&mut self, site: &SiteRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO sites (site_id, customer_id, url, enabled) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(site_id) DO UPDATE SET
                customer_id = excluded.customer_id,
                url = excluded.url,
                enabled = excluded.enabled",
            params![site.site_id, site.customer_id, site.url, site.enabled as i64],
        )?;
        Ok(())
    }

    fn list_enabled_sites(
        &self,
        site_id: Option<i64>,
        customer_id: Option<i64>,
    ) -> StorageResult<Vec<SiteRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT site_id, customer_id, url, enabled FROM sites
             WHERE enabled = 1
               AND (?1 IS NULL OR site_id = ?1)
               AND (?2 IS NULL OR customer_id = ?2)
             ORDER BY site_id",
        )?;

        let sites = stmt
            .query_map(params![site_id, customer_id], row_to_site)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(sites)
    }

    fn create_job(&mut self, job: &CrawlJobRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO crawl_jobs
                (job_id, site_id, customer_id, start_url, status, pages_crawled, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                job.job_id,
                job.site_id,
                job.customer_id,
                job.start_url,
                job.status.to_db_string(),
                job.pages_crawled as i64,
                job.started_at,
            ],
        )?;
        Ok(())
    }

    fn get_job(&self, job_id: &str) -> StorageResult<Option<CrawlJobRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT job_id, site_id, customer_id, start_url, status, pages_crawled,
                    started_at, completed_at, error_msg
             FROM crawl_jobs WHERE job_id = ?1",
        )?;

        Ok(stmt.query_row(params![job_id], row_to_job).optional()?)
    }

    fn complete_job(&mut self, job_id: &str, pages_crawled: u64) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE crawl_jobs
             SET status = 'completed', pages_crawled = ?1, completed_at = ?2
             WHERE job_id = ?3",
            params![pages_crawled as i64, Utc::now().to_rfc3339(), job_id],
        )?;
        if updated == 0 {
            return Err(StorageError::JobNotFound(job_id.to_string()));
        }
        Ok(())
    }

    fn fail_job(&mut self, job_id: &str, error_msg: &str, pages_crawled: u64) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE crawl_jobs
             SET status = 'failed', pages_crawled = ?1, completed_at = ?2, error_msg = ?3
             WHERE job_id = ?4",
            params![
                pages_crawled as i64,
                Utc::now().to_rfc3339(),
                error_msg,
                job_id
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::JobNotFound(job_id.to_string()));
        }
        Ok(())
    }

    fn insert_crawl_page(&mut self, page: &CrawlPageRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO crawl_pages
                (job_id, site_id, url, parent_url, status_code, content_type,
                 content_length, response_time_ms, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                page.job_id,
                page.site_id,
                page.url,
                page.parent_url,
                page.status_code,
                page.content_type,
                page.content_length.map(|v| v as i64),
                page.response_time_ms.map(|v| v as i64),
                page.fetched_at,
            ],
        )?;
        Ok(())
    }

    fn count_crawl_pages(&self, job_id: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM crawl_pages WHERE job_id = ?1",
            params![job_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn upsert_baseline(&mut self, baseline: &BaselineRecord) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO baselines
                (site_id, url, html_hash, structural_hash, norm_version, snapshot_path,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(site_id, url, norm_version) DO UPDATE SET
                html_hash = excluded.html_hash,
                structural_hash = excluded.structural_hash,
                snapshot_path = excluded.snapshot_path,
                updated_at = excluded.updated_at",
            params![
                baseline.site_id,
                baseline.url,
                baseline.html_hash,
                baseline.structural_hash,
                baseline.norm_version,
                baseline.snapshot_path,
                Utc::now().to_rfc3339(),
            ],
        )?;

        let id: i64 = self.conn.query_row(
            "SELECT id FROM baselines WHERE site_id = ?1 AND url = ?2 AND norm_version = ?3",
            params![baseline.site_id, baseline.url, baseline.norm_version],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn get_baseline(
        &self,
        site_id: i64,
        url: &str,
        norm_version: &str,
    ) -> StorageResult<Option<BaselineRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, site_id, url, html_hash, structural_hash, norm_version,
                    snapshot_path, created_at, updated_at
             FROM baselines WHERE site_id = ?1 AND url = ?2 AND norm_version = ?3",
        )?;

        Ok(stmt
            .query_row(params![site_id, url, norm_version], row_to_baseline)
            .optional()?)
    }

    fn count_baselines(&self, site_id: i64) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM baselines WHERE site_id = ?1",
            params![site_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn insert_diff_evidence(&mut self, evidence: &DiffEvidenceRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO diff_evidence
                (site_id, url, baseline_hash, observed_hash, diff_summary, severity,
                 status, detected_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                evidence.site_id,
                evidence.url,
                evidence.baseline_hash,
                evidence.observed_hash,
                evidence.diff_summary,
                evidence.severity,
                evidence.status,
                evidence.detected_at,
            ],
        )?;
        Ok(())
    }

    fn count_diff_evidence(&self, site_id: i64) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM diff_evidence WHERE site_id = ?1",
            params![site_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_diff_evidence_by_status(&self, site_id: i64, status: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM diff_evidence WHERE site_id = ?1 AND status = ?2",
            params![site_id, status],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
