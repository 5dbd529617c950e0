//! Database schema definitions

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Monitored sites (managed externally, read-only to the crawler)
CREATE TABLE IF NOT EXISTS sites (
    site_id INTEGER PRIMARY KEY,
    customer_id INTEGER NOT NULL,
    url TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1
);

-- One row per site crawl
CREATE TABLE IF NOT EXISTS crawl_jobs (
    job_id TEXT PRIMARY KEY,
    site_id INTEGER NOT NULL REFERENCES sites(site_id),
    customer_id INTEGER NOT NULL,
    start_url TEXT NOT NULL,
    status TEXT NOT NULL,
    pages_crawled INTEGER NOT NULL DEFAULT 0,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    error_msg TEXT
);

CREATE INDEX IF NOT EXISTS idx_crawl_jobs_site ON crawl_jobs(site_id);

-- Per-fetch metadata, appended in CRAWL mode
CREATE TABLE IF NOT EXISTS crawl_pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id TEXT NOT NULL REFERENCES crawl_jobs(job_id),
    site_id INTEGER NOT NULL,
    url TEXT NOT NULL,
    parent_url TEXT,
    status_code INTEGER,
    content_type TEXT,
    content_length INTEGER,
    response_time_ms INTEGER,
    fetched_at TEXT NOT NULL,
    UNIQUE(job_id, url)
);

CREATE INDEX IF NOT EXISTS idx_crawl_pages_job ON crawl_pages(job_id);
CREATE INDEX IF NOT EXISTS idx_crawl_pages_site ON crawl_pages(site_id);

-- Baseline rows; the normalized snapshot lives on disk at snapshot_path
CREATE TABLE IF NOT EXISTS baselines (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id INTEGER NOT NULL,
    url TEXT NOT NULL,
    html_hash TEXT NOT NULL,
    structural_hash TEXT NOT NULL,
    norm_version TEXT NOT NULL,
    snapshot_path TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(site_id, url, norm_version)
);

CREATE INDEX IF NOT EXISTS idx_baselines_site_url ON baselines(site_id, url);

-- Immutable verdict evidence from COMPARE runs
CREATE TABLE IF NOT EXISTS diff_evidence (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id INTEGER NOT NULL,
    url TEXT NOT NULL,
    baseline_hash TEXT,
    observed_hash TEXT,
    diff_summary TEXT NOT NULL,
    severity TEXT NOT NULL,
    status TEXT NOT NULL,
    detected_at TEXT NOT NULL,
    closed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_diff_evidence_site ON diff_evidence(site_id);
"#;

/// Initializes the database schema; safe to run repeatedly
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)
}
