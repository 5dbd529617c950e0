//! SiteVigil: a defacement-detection crawler
//!
//! This crate implements a multi-site crawl pipeline that discovers URLs from
//! seed domains, fetches them (with an optional headless-render escalation for
//! JavaScript-heavy pages), normalizes and fingerprints the content, and in
//! three selectable modes either records crawl metadata, persists per-URL
//! semantic baselines, or compares live pages against stored baselines to
//! emit defacement verdicts.

pub mod compare;
pub mod config;
pub mod crawler;
pub mod fetch;
pub mod fingerprint;
pub mod frontier;
pub mod render;
pub mod report;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for SiteVigil operations
#[derive(Debug, Error)]
pub enum VigilError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] fetch::FetchError),

    #[error("Render error: {0}")]
    Render(#[from] render::RenderError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Site job failed for site {site_id}: {reason}")]
    JobFailed { site_id: i64, reason: String },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {message}")]
    Invalid { var: String, message: String },

    #[error("Validation error: {0}")]
    Validation(String),
}

/// URL-specific errors
///
/// `Invalid` covers unparseable input and non-web schemes; `OutOfScope`
/// covers hosts whose registrable domain does not match the site's seed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("Invalid URL: {0}")]
    Invalid(String),

    #[error("URL out of crawl scope: {url} (seed domain: {seed})")]
    OutOfScope { url: String, seed: String },
}

/// Result type alias for SiteVigil operations
pub type Result<T> = std::result::Result<T, VigilError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use compare::{Comparator, ComparePolicy, Severity, Verdict, VerdictStatus};
pub use config::{Config, CrawlMode};
pub use fingerprint::{content_hash, semantic_normalize, structural_hash, NORM_VERSION};
pub use frontier::Frontier;
pub use url::{canonicalize, canonicalize_in_scope, SeedScope};
