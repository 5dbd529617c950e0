//! Per-site job runner
//!
//! Owns one site crawl end to end: job row, frontier, worker pool,
//! dynamic scaling, drain detection, and the terminal job status.

use crate::compare::{Comparator, ComparePolicy};
use crate::config::Config;
use crate::crawler::worker::{JobInfo, Worker, WorkerContext};
use crate::fetch::{build_http_client, Fetcher, RetryPolicy, SiteThrottle};
use crate::fingerprint::NORM_VERSION;
use crate::frontier::Frontier;
use crate::render::RenderPool;
use crate::report;
use crate::storage::{
    CrawlJobRecord, DbHandle, JobStatus, SiteRecord, SnapshotStore, Storage,
};
use crate::url::{canonicalize, SeedScope};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Scaling parameters of the 2-second control loop
const SCALE_TICK: Duration = Duration::from_secs(2);
const SCALE_UP_PENDING: usize = 100;
const SCALE_DOWN_PENDING: usize = 10;
const SCALE_DOWN_IDLE: Duration = Duration::from_secs(5);
/// Consecutive idle ticks before the frontier is considered drained
const DRAIN_TICKS: u32 = 2;

/// Terminal result of one site job
#[derive(Debug, Clone)]
pub struct SiteJobOutcome {
    pub site_id: i64,
    pub job_id: String,
    pub status: JobStatus,
    pub pages_crawled: u64,
    pub error: Option<String>,
}

impl SiteJobOutcome {
    fn failed(site_id: i64, job_id: String, pages: u64, reason: impl Into<String>) -> Self {
        Self {
            site_id,
            job_id,
            status: JobStatus::Failed,
            pages_crawled: pages,
            error: Some(reason.into()),
        }
    }
}

/// Runs one complete site crawl.
///
/// Worker-level failures stay inside workers; this function fails the job
/// only for unrecoverable conditions (database unavailable, cancellation,
/// unusable seed).
pub async fn run_site_job(
    config: Arc<Config>,
    db: Arc<DbHandle>,
    render: Arc<RenderPool>,
    snapshots: Arc<SnapshotStore>,
    site: SiteRecord,
    cancel: CancellationToken,
) -> SiteJobOutcome {
    let job_id = Uuid::new_v4().to_string();
    let started = Instant::now();

    report::print_banner(&format!(
        "site {} ({}) job {job_id} [{}]",
        site.site_id, site.url, config.mode
    ));

    // Seed canonicalization defines the crawl scope
    let seed = match canonicalize(&site.url) {
        Ok(seed) => seed,
        Err(e) => {
            return SiteJobOutcome::failed(site.site_id, job_id, 0, format!("invalid seed: {e}"));
        }
    };
    let scope = match SeedScope::from_seed(&seed) {
        Ok(scope) => scope,
        Err(e) => {
            return SiteJobOutcome::failed(site.site_id, job_id, 0, format!("invalid seed: {e}"));
        }
    };

    let job_record = CrawlJobRecord {
        job_id: job_id.clone(),
        site_id: site.site_id,
        customer_id: site.customer_id,
        start_url: seed.to_string(),
        status: JobStatus::Running,
        pages_crawled: 0,
        started_at: Utc::now().to_rfc3339(),
        completed_at: None,
        error_msg: None,
    };
    if let Err(e) = db.run(move |s| s.create_job(&job_record)).await {
        return SiteJobOutcome::failed(site.site_id, job_id, 0, format!("database unavailable: {e}"));
    }

    let client = match build_http_client(&config.fetch) {
        Ok(client) => client,
        Err(e) => {
            let reason = format!("http client: {e}");
            let _ = fail_job(&db, &job_id, &reason, 0).await;
            return SiteJobOutcome::failed(site.site_id, job_id, 0, reason);
        }
    };

    let frontier = Arc::new(Frontier::new(scope));
    frontier.enqueue(seed.as_str(), None, 0);

    let throttle = Arc::new(SiteThrottle::new());
    let fetcher = Arc::new(Fetcher::new(client, RetryPolicy::default(), throttle));
    let pages_crawled = Arc::new(AtomicU64::new(0));
    let db_down = Arc::new(AtomicBool::new(false));

    let ctx = Arc::new(WorkerContext {
        config: Arc::clone(&config),
        job: JobInfo {
            job_id: job_id.clone(),
            site_id: site.site_id,
            customer_id: site.customer_id,
            mode: config.mode,
        },
        frontier: Arc::clone(&frontier),
        fetcher,
        render,
        db: Arc::clone(&db),
        snapshots,
        comparator: Arc::new(Comparator::new(ComparePolicy::default(), NORM_VERSION)),
        cancel: cancel.clone(),
        pages_crawled: Arc::clone(&pages_crawled),
        db_down: Arc::clone(&db_down),
        spa_site: Arc::new(AtomicBool::new(false)),
    });

    let mut workers: Vec<Worker> = Vec::new();
    let mut next_worker_id = 0usize;
    for _ in 0..config.workers.min_workers {
        workers.push(Worker::spawn(next_worker_id, Arc::clone(&ctx)));
        next_worker_id += 1;
    }

    // Dynamic scaling loop
    let mut ticker = tokio::time::interval(SCALE_TICK);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut idle_ticks: u32 = 0;
    let mut cancelled = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.cancelled() => {
                cancelled = true;
                break;
            }
        }

        if db_down.load(Ordering::Acquire) {
            break;
        }

        // Reap workers that exited on a terminate signal
        workers.retain(|w| !w.is_finished());

        let pending = frontier.pending_count();
        let active = workers.iter().filter(|w| w.is_active()).count();
        let all_idle = workers.iter().all(|w| w.is_idle());

        tracing::debug!(
            "site {}: pending={pending} workers={active} idle_ticks={idle_ticks}",
            site.site_id
        );

        if pending == 0 && all_idle {
            idle_ticks += 1;
            if idle_ticks >= DRAIN_TICKS {
                break;
            }
            continue;
        }
        idle_ticks = 0;

        if pending > SCALE_UP_PENDING && active < config.workers.max_workers {
            tracing::info!("site {}: scaling up to {} workers", site.site_id, active + 1);
            workers.push(Worker::spawn(next_worker_id, Arc::clone(&ctx)));
            next_worker_id += 1;
        } else if pending < SCALE_DOWN_PENDING && active > config.workers.min_workers {
            if let Some(worker) = workers
                .iter()
                .find(|w| w.is_active() && w.idle_for() >= SCALE_DOWN_IDLE)
            {
                tracing::info!(
                    "site {}: retiring idle worker {}",
                    site.site_id,
                    worker.id
                );
                worker.terminate();
            }
        }
    }

    // Close the frontier and join the pool; in-flight work finishes or
    // times out on its own
    frontier.close();
    for worker in workers {
        worker.join().await;
    }

    let pages = pages_crawled.load(Ordering::Relaxed);

    report::print_blocked_report(site.site_id, frontier.block_report());

    let outcome = if db_down.load(Ordering::Acquire) {
        // Best effort: the store may already be gone
        let _ = fail_job(&db, &job_id, "database unavailable", pages).await;
        SiteJobOutcome::failed(site.site_id, job_id, pages, "database unavailable")
    } else if cancelled {
        let _ = fail_job(&db, &job_id, "cancelled", pages).await;
        SiteJobOutcome::failed(site.site_id, job_id, pages, "cancelled")
    } else {
        match db
            .run({
                let job_id = job_id.clone();
                move |s| s.complete_job(&job_id, pages)
            })
            .await
        {
            Ok(()) => SiteJobOutcome {
                site_id: site.site_id,
                job_id,
                status: JobStatus::Completed,
                pages_crawled: pages,
                error: None,
            },
            Err(e) => SiteJobOutcome::failed(
                site.site_id,
                job_id,
                pages,
                format!("completing job: {e}"),
            ),
        }
    };

    report::print_job_summary(&site.url, &outcome, started.elapsed(), frontier.visited_count());

    outcome
}

async fn fail_job(
    db: &DbHandle,
    job_id: &str,
    reason: &str,
    pages: u64,
) -> crate::storage::StorageResult<()> {
    let job_id = job_id.to_string();
    let reason = reason.to_string();
    db.run(move |s| s.fail_job(&job_id, &reason, pages)).await
}
