//! Configuration module for SiteVigil
//!
//! All configuration is sourced from the environment with defaults, so the
//! crawler can run unconfigured against a local database. Durations are
//! surfaced as `std::time::Duration`; raw second values never leak past this
//! module.

use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Operating mode of the crawl pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlMode {
    /// Record crawl metadata per fetched page
    Crawl,
    /// Persist per-URL semantic baselines
    Baseline,
    /// Compare live pages against stored baselines
    Compare,
}

impl CrawlMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crawl => "CRAWL",
            Self::Baseline => "BASELINE",
            Self::Compare => "COMPARE",
        }
    }
}

impl FromStr for CrawlMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CRAWL" => Ok(Self::Crawl),
            "BASELINE" => Ok(Self::Baseline),
            "COMPARE" => Ok(Self::Compare),
            other => Err(ConfigError::Invalid {
                var: "CRAWL_MODE".to_string(),
                message: format!("expected CRAWL, BASELINE or COMPARE, got '{other}'"),
            }),
        }
    }
}

impl std::fmt::Display for CrawlMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Worker pool and scheduler limits
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Workers spawned at site-job start
    pub min_workers: usize,

    /// Upper bound for dynamic scaling
    pub max_workers: usize,

    /// Concurrent site jobs
    pub max_parallel_sites: usize,

    /// Delay each worker applies between its own requests
    pub crawl_delay: Duration,
}

/// HTTP fetch configuration
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Per-request timeout
    pub request_timeout: Duration,

    /// User-Agent header sent with every request
    pub user_agent: String,
}

/// Headless-render configuration
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Navigation timeout for the headless page load
    pub goto_timeout: Duration,

    /// Extra wait for client-side hydration after load
    pub hydration_wait: Duration,

    /// Quiet period required before the DOM is considered settled
    pub stability: Duration,

    /// Concurrent browser contexts
    pub contexts: usize,

    /// Render cache capacity (entries)
    pub cache_capacity: usize,

    /// Render cache TTL
    pub cache_ttl: Duration,
}

/// Relational store configuration
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file
    pub path: PathBuf,

    /// Maximum concurrent storage callers
    pub pool_size: usize,

    /// How long a caller waits for a storage slot before the job
    /// is considered to have lost the database
    pub acquire_timeout: Duration,
}

/// Baseline snapshot storage configuration
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Root directory of the baseline snapshot tree
    pub root: PathBuf,
}

/// Main configuration structure for SiteVigil
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: CrawlMode,
    pub workers: WorkerConfig,
    pub fetch: FetchConfig,
    pub render: RenderConfig,
    pub db: DbConfig,
    pub snapshots: SnapshotConfig,
}

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

impl Config {
    /// Loads configuration from the environment, applying defaults for
    /// everything that is unset and validating the result.
    pub fn from_env() -> ConfigResult<Self> {
        let mode = match env::var("CRAWL_MODE") {
            Ok(v) => v.parse()?,
            Err(_) => CrawlMode::Crawl,
        };

        let config = Self {
            mode,
            workers: WorkerConfig {
                min_workers: parse_var("MIN_WORKERS", 5)?,
                max_workers: parse_var("MAX_WORKERS", 50)?,
                max_parallel_sites: parse_var("MAX_PARALLEL_SITES", 3)?,
                crawl_delay: secs_f64_var("CRAWL_DELAY", 1.0)?,
            },
            fetch: FetchConfig {
                request_timeout: secs_var("REQUEST_TIMEOUT", 20)?,
                user_agent: env::var("USER_AGENT").unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string()),
            },
            render: RenderConfig {
                goto_timeout: secs_var("JS_GOTO_TIMEOUT", 30)?,
                hydration_wait: secs_var("JS_WAIT_TIMEOUT", 8)?,
                stability: secs_var("JS_STABILITY_TIME", 5)?,
                contexts: parse_var("RENDER_CONTEXTS", 2)?,
                cache_capacity: parse_var("RENDER_CACHE_SIZE", 512)?,
                cache_ttl: secs_var("RENDER_CACHE_TTL", 3600)?,
            },
            db: DbConfig {
                path: env::var("DB_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./sitevigil.db")),
                pool_size: parse_var("DB_POOL_SIZE", 16)?,
                acquire_timeout: secs_var("DB_SEMAPHORE", 10)?,
            },
            snapshots: SnapshotConfig {
                root: env::var("BASELINE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./baselines")),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field constraints
    pub fn validate(&self) -> ConfigResult<()> {
        if self.workers.min_workers == 0 {
            return Err(ConfigError::Validation(
                "MIN_WORKERS must be at least 1".to_string(),
            ));
        }

        if self.workers.max_workers < self.workers.min_workers {
            return Err(ConfigError::Validation(format!(
                "MAX_WORKERS ({}) must be >= MIN_WORKERS ({})",
                self.workers.max_workers, self.workers.min_workers
            )));
        }

        if self.workers.max_parallel_sites == 0 {
            return Err(ConfigError::Validation(
                "MAX_PARALLEL_SITES must be at least 1".to_string(),
            ));
        }

        if self.db.pool_size == 0 || self.db.pool_size > 32 {
            return Err(ConfigError::Validation(format!(
                "DB_POOL_SIZE must be between 1 and 32, got {}",
                self.db.pool_size
            )));
        }

        if self.render.contexts == 0 {
            return Err(ConfigError::Validation(
                "RENDER_CONTEXTS must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for Config {
    /// Built-in defaults, identical to an empty environment
    fn default() -> Self {
        Self {
            mode: CrawlMode::Crawl,
            workers: WorkerConfig {
                min_workers: 5,
                max_workers: 50,
                max_parallel_sites: 3,
                crawl_delay: Duration::from_secs_f64(1.0),
            },
            fetch: FetchConfig {
                request_timeout: Duration::from_secs(20),
                user_agent: DEFAULT_USER_AGENT.to_string(),
            },
            render: RenderConfig {
                goto_timeout: Duration::from_secs(30),
                hydration_wait: Duration::from_secs(8),
                stability: Duration::from_secs(5),
                contexts: 2,
                cache_capacity: 512,
                cache_ttl: Duration::from_secs(3600),
            },
            db: DbConfig {
                path: PathBuf::from("./sitevigil.db"),
                pool_size: 16,
                acquire_timeout: Duration::from_secs(10),
            },
            snapshots: SnapshotConfig {
                root: PathBuf::from("./baselines"),
            },
        }
    }
}

fn parse_var<T: FromStr>(var: &str, default: T) -> ConfigResult<T> {
    match env::var(var) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            var: var.to_string(),
            message: format!("could not parse '{raw}'"),
        }),
        Err(_) => Ok(default),
    }
}

fn secs_var(var: &str, default: u64) -> ConfigResult<Duration> {
    parse_var(var, default).map(Duration::from_secs)
}

fn secs_f64_var(var: &str, default: f64) -> ConfigResult<Duration> {
    let secs: f64 = parse_var(var, default)?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(ConfigError::Invalid {
            var: var.to_string(),
            message: "must be a non-negative number of seconds".to_string(),
        });
    }
    Ok(Duration::from_secs_f64(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_values_match_contract() {
        let config = Config::default();
        assert_eq!(config.workers.min_workers, 5);
        assert_eq!(config.workers.max_workers, 50);
        assert_eq!(config.workers.max_parallel_sites, 3);
        assert_eq!(config.fetch.request_timeout, Duration::from_secs(20));
        assert_eq!(config.workers.crawl_delay, Duration::from_secs(1));
        assert_eq!(config.render.goto_timeout, Duration::from_secs(30));
        assert_eq!(config.render.hydration_wait, Duration::from_secs(8));
        assert_eq!(config.render.stability, Duration::from_secs(5));
        assert_eq!(config.db.acquire_timeout, Duration::from_secs(10));
        assert_eq!(config.render.cache_ttl, Duration::from_secs(3600));
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("crawl".parse::<CrawlMode>().unwrap(), CrawlMode::Crawl);
        assert_eq!("BASELINE".parse::<CrawlMode>().unwrap(), CrawlMode::Baseline);
        assert_eq!("Compare".parse::<CrawlMode>().unwrap(), CrawlMode::Compare);
        assert!("watch".parse::<CrawlMode>().is_err());
    }

    #[test]
    fn test_validation_rejects_worker_inversion() {
        let mut config = Config::default();
        config.workers.min_workers = 10;
        config.workers.max_workers = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_oversized_pool() {
        let mut config = Config::default();
        config.db.pool_size = 64;
        assert!(config.validate().is_err());
    }
}
