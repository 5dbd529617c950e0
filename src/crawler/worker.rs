//! Worker: the per-URL processing loop
//!
//! A worker owns no URL outside the window between dequeue and
//! mark_done/mark_failed. A failing URL never kills the worker task or
//! the site job; the only fatal condition is storage unavailability,
//! which is surfaced to the site runner through a shared flag.

use crate::compare::{Comparator, LiveObservation};
use crate::config::{Config, CrawlMode};
use crate::fetch::{FetchClass, FetchError, FetchOutcome, Fetcher};
use crate::fingerprint::{
    content_hash, extract_script_srcs, extract_urls, semantic_normalize, structural_hash,
    NORM_VERSION,
};
use crate::frontier::{Frontier, FrontierTask};
use crate::render::{needs_js_rendering, RenderPool};
use crate::url::classify_block;
use crate::storage::{
    BaselineRecord, CrawlPageRecord, DbHandle, DiffEvidenceRecord, PageVersion, SnapshotStore,
    Storage, StorageError, StorageResult,
};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Identity of the crawl job a worker serves
#[derive(Debug, Clone)]
pub struct JobInfo {
    pub job_id: String,
    pub site_id: i64,
    pub customer_id: i64,
    pub mode: CrawlMode,
}

/// Everything a worker needs, passed explicitly through the site-runner
/// construction path (no process-wide state)
pub struct WorkerContext {
    pub config: Arc<Config>,
    pub job: JobInfo,
    pub frontier: Arc<Frontier>,
    pub fetcher: Arc<Fetcher>,
    pub render: Arc<RenderPool>,
    pub db: Arc<DbHandle>,
    pub snapshots: Arc<SnapshotStore>,
    pub comparator: Arc<Comparator>,
    /// Site-level cancel; observed between tasks, never mid-fetch
    pub cancel: CancellationToken,
    pub pages_crawled: Arc<AtomicU64>,
    /// Set when storage becomes unavailable; fatal to the site job
    pub db_down: Arc<AtomicBool>,
    /// Site hint: content needs JS rendering, skip the plain fetch
    pub spa_site: Arc<AtomicBool>,
}

/// Handle to a spawned worker task
pub struct Worker {
    pub id: usize,
    idle: Arc<AtomicBool>,
    idle_since: Arc<Mutex<Instant>>,
    entered: Arc<AtomicBool>,
    shutdown: CancellationToken,
    join: JoinHandle<()>,
}

impl Worker {
    /// Spawns a worker task. It counts toward the pool only once it has
    /// entered the dequeue loop (see [`Worker::is_active`]).
    pub fn spawn(id: usize, ctx: Arc<WorkerContext>) -> Self {
        let idle = Arc::new(AtomicBool::new(true));
        let idle_since = Arc::new(Mutex::new(Instant::now()));
        let entered = Arc::new(AtomicBool::new(false));
        let shutdown = CancellationToken::new();

        let join = tokio::spawn(run_worker(
            id,
            ctx,
            shutdown.clone(),
            Arc::clone(&idle),
            Arc::clone(&idle_since),
            Arc::clone(&entered),
        ));

        Self {
            id,
            idle,
            idle_since,
            entered,
            shutdown,
            join,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.idle.load(Ordering::Acquire)
    }

    /// How long this worker has been idle; zero while busy
    pub fn idle_for(&self) -> Duration {
        if !self.is_idle() {
            return Duration::ZERO;
        }
        self.idle_since.lock().unwrap().elapsed()
    }

    /// Entered the dequeue loop and not yet exited
    pub fn is_active(&self) -> bool {
        self.entered.load(Ordering::Acquire) && !self.join.is_finished()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Asks the worker to exit after its current task
    pub fn terminate(&self) {
        self.shutdown.cancel();
    }

    pub async fn join(self) {
        let _ = self.join.await;
    }
}

async fn run_worker(
    id: usize,
    ctx: Arc<WorkerContext>,
    shutdown: CancellationToken,
    idle: Arc<AtomicBool>,
    idle_since: Arc<Mutex<Instant>>,
    entered: Arc<AtomicBool>,
) {
    entered.store(true, Ordering::Release);
    tracing::info!("[Worker-{id}] started ({})", ctx.job.mode);

    loop {
        idle.store(true, Ordering::Release);
        *idle_since.lock().unwrap() = Instant::now();

        let task = tokio::select! {
            task = ctx.frontier.dequeue() => task,
            _ = shutdown.cancelled() => None,
            _ = ctx.cancel.cancelled() => None,
        };

        let Some(task) = task else { break };
        idle.store(false, Ordering::Release);

        process_task(id, &ctx, &task).await;
    }

    tracing::info!("[Worker-{id}] exiting");
}

/// Page content ready for the normalize/hash/dispatch pipeline
struct PageContent {
    html: String,
    final_url: Url,
    status: u16,
    content_type: String,
    content_length: u64,
    elapsed_ms: u64,
}

/// What the fetch/render decision produced
enum Acquired {
    Content(PageContent),
    /// Classified response without a usable body (ignored type, 4xx, 5xx)
    Skipped {
        status: u16,
        content_type: String,
        elapsed_ms: u64,
        class: FetchClass,
    },
}

async fn process_task(worker_id: usize, ctx: &WorkerContext, task: &FrontierTask) {
    // The deny rules are authoritative here too, not only at enqueue time
    if let Some(rule) = classify_block(&task.url) {
        tracing::debug!("[Worker-{worker_id}] blocked {} ({rule})", task.url);
        ctx.frontier.mark_blocked(&task.url, rule);
        return;
    }

    // Per-worker delay between its own requests
    tokio::time::sleep(ctx.config.workers.crawl_delay).await;

    match acquire_content(worker_id, ctx, task).await {
        Ok(Acquired::Content(content)) => {
            if let Err(e) = handle_page(worker_id, ctx, task, &content).await {
                note_storage_error(ctx, &e);
                tracing::error!("[Worker-{worker_id}] persist failed for {}: {e}", task.url);
                ctx.frontier.mark_failed(&task.url);
                return;
            }

            // Parse links and feed the frontier
            for link in extract_urls(&content.html, &content.final_url) {
                ctx.frontier
                    .enqueue(link.as_str(), Some(&content.final_url), task.depth + 1);
            }

            ctx.pages_crawled.fetch_add(1, Ordering::Relaxed);
            ctx.frontier.mark_done(&task.url);
        }
        Ok(Acquired::Skipped {
            status,
            content_type,
            elapsed_ms,
            class,
        }) => {
            tracing::info!(
                "[Worker-{worker_id}] {} {} ({}, {} ms)",
                status,
                task.url,
                class.as_str(),
                elapsed_ms
            );
            if ctx.job.mode == CrawlMode::Crawl {
                let record = crawl_page_record(
                    ctx,
                    task,
                    &task.url,
                    Some(status),
                    Some(content_type),
                    None,
                    Some(elapsed_ms),
                );
                if let Err(e) = insert_crawl_page(ctx, record).await {
                    note_storage_error(ctx, &e);
                }
            }
            ctx.frontier.mark_failed(&task.url);
        }
        Err(fetch_error) => {
            let kind = match &fetch_error {
                FetchError::Timeout { .. } => "fetch_timeout",
                FetchError::Network { .. } => "fetch_network",
            };
            tracing::warn!("[Worker-{worker_id}] {kind} for {}: {fetch_error}", task.url);
            if ctx.job.mode == CrawlMode::Crawl {
                let record =
                    crawl_page_record(ctx, task, &task.url, None, None, None, None);
                if let Err(e) = insert_crawl_page(ctx, record).await {
                    note_storage_error(ctx, &e);
                }
            }
            ctx.frontier.mark_failed(&task.url);
        }
    }
}

/// Fetch/render decision: plain fetch first unless the site is known to be
/// a SPA; escalate to render on SPA markers; fall back to the fetched body
/// when the render fails.
async fn acquire_content(
    worker_id: usize,
    ctx: &WorkerContext,
    task: &FrontierTask,
) -> Result<Acquired, FetchError> {
    if ctx.spa_site.load(Ordering::Relaxed) {
        match ctx.render.render(&task.url).await {
            Ok(artifact) => {
                let length = artifact.body.len() as u64;
                tracing::info!(
                    "[Worker-{worker_id}] 200 {} (rendered, {} ms)",
                    task.url,
                    artifact.elapsed_ms
                );
                return Ok(Acquired::Content(PageContent {
                    html: artifact.body,
                    final_url: task.url.clone(),
                    status: 200,
                    content_type: "text/html".to_string(),
                    content_length: length,
                    elapsed_ms: artifact.elapsed_ms,
                }));
            }
            Err(e) => {
                tracing::warn!("[Worker-{worker_id}] render failed for {}: {e}", task.url);
                // No pre-render body yet; fall through to the plain fetch
            }
        }
    }

    let outcome: FetchOutcome = ctx.fetcher.fetch(&task.url, task.parent.as_ref()).await?;

    if outcome.class != FetchClass::Ok {
        return Ok(Acquired::Skipped {
            status: outcome.status,
            content_type: outcome.content_type,
            elapsed_ms: outcome.elapsed_ms,
            class: outcome.class,
        });
    }

    let body_bytes = outcome.body.unwrap_or_default();
    let mut html = String::from_utf8_lossy(&body_bytes).into_owned();
    let mut elapsed_ms = outcome.elapsed_ms;

    if outcome.soft_redirect {
        tracing::debug!("[Worker-{worker_id}] soft redirect markers in {}", task.url);
    }

    if needs_js_rendering(&html) {
        match ctx.render.render(&task.url).await {
            Ok(artifact) => {
                ctx.spa_site.store(true, Ordering::Relaxed);
                elapsed_ms += artifact.elapsed_ms;
                html = artifact.body;
            }
            Err(e) => {
                // Keep the pre-render body
                tracing::warn!(
                    "[Worker-{worker_id}] render failed for {}, using fetched body: {e}",
                    task.url
                );
            }
        }
    }

    tracing::info!(
        "[Worker-{worker_id}] {} {} ({} bytes, {} ms)",
        outcome.status,
        task.url,
        html.len(),
        elapsed_ms
    );

    Ok(Acquired::Content(PageContent {
        content_length: html.len() as u64,
        html,
        final_url: outcome.final_url,
        status: outcome.status,
        content_type: outcome.content_type,
        elapsed_ms,
    }))
}

/// Mode dispatch for one successfully acquired page
async fn handle_page(
    worker_id: usize,
    ctx: &WorkerContext,
    task: &FrontierTask,
    content: &PageContent,
) -> StorageResult<()> {
    match ctx.job.mode {
        CrawlMode::Crawl => {
            let record = crawl_page_record(
                ctx,
                task,
                &content.final_url,
                Some(content.status),
                Some(content.content_type.clone()),
                Some(content.content_length),
                Some(content.elapsed_ms),
            );
            insert_crawl_page(ctx, record).await
        }
        CrawlMode::Baseline => {
            let normalized = semantic_normalize(&content.html);
            let version = PageVersion {
                url: task.url.to_string(),
                content_hash: content_hash(&normalized.text),
                structural_hash: structural_hash(&normalized.tag_paths),
                normalized_text: normalized.text,
                tag_paths: normalized.tag_paths,
                script_srcs: extract_script_srcs(&content.html, &content.final_url),
                norm_version: NORM_VERSION.to_string(),
                created_at: Utc::now().to_rfc3339(),
            };

            let snapshot_path = ctx
                .snapshots
                .write_snapshot(ctx.job.customer_id, ctx.job.site_id, &version)
                .await?;

            let record = BaselineRecord {
                id: 0,
                site_id: ctx.job.site_id,
                url: version.url.clone(),
                html_hash: version.content_hash.clone(),
                structural_hash: version.structural_hash.clone(),
                norm_version: version.norm_version.clone(),
                snapshot_path: snapshot_path.to_string_lossy().into_owned(),
                created_at: String::new(),
                updated_at: String::new(),
            };

            ctx.db.run(move |s| s.upsert_baseline(&record)).await?;
            tracing::info!("[Worker-{worker_id}] baseline saved for {}", task.url);
            Ok(())
        }
        CrawlMode::Compare => {
            let normalized = semantic_normalize(&content.html);
            let live = LiveObservation {
                url: task.url.to_string(),
                normalized_text: normalized.text,
                tag_paths: normalized.tag_paths,
                script_srcs: extract_script_srcs(&content.html, &content.final_url),
            };

            let site_id = ctx.job.site_id;
            let key_url = task.url.to_string();
            let row = ctx
                .db
                .run(move |s| s.get_baseline(site_id, &key_url, NORM_VERSION))
                .await?;

            let verdict = match row {
                Some(row) => {
                    match ctx
                        .snapshots
                        .load_page_version(std::path::Path::new(&row.snapshot_path))
                    {
                        Ok(baseline) => ctx.comparator.compare(&live, &baseline),
                        Err(e) => {
                            tracing::error!(
                                "[Worker-{worker_id}] unreadable baseline snapshot {}: {e}",
                                row.snapshot_path
                            );
                            ctx.comparator.no_baseline(&live.url, &live.normalized_text)
                        }
                    }
                }
                None => ctx.comparator.no_baseline(&live.url, &live.normalized_text),
            };

            let summary = serde_json::json!({
                "structural_drift": verdict.structural_drift,
                "content_drift": verdict.content_drift,
                "confidence": verdict.confidence,
                "indicators": verdict.indicators,
            });

            let evidence = DiffEvidenceRecord {
                site_id: ctx.job.site_id,
                url: verdict.url.clone(),
                baseline_hash: verdict.baseline_hash.clone(),
                observed_hash: verdict.observed_hash.clone(),
                diff_summary: summary.to_string(),
                severity: verdict.severity.as_str().to_string(),
                status: verdict.status.as_str().to_string(),
                detected_at: verdict.detected_at.to_rfc3339(),
            };

            ctx.db.run(move |s| s.insert_diff_evidence(&evidence)).await?;

            match verdict.status {
                crate::compare::VerdictStatus::Clean => {
                    tracing::info!("[Worker-{worker_id}] CLEAN {}", task.url)
                }
                status => tracing::warn!(
                    "[Worker-{worker_id}] {} {} (severity {}, confidence {:.2})",
                    status,
                    task.url,
                    verdict.severity,
                    verdict.confidence
                ),
            }
            Ok(())
        }
    }
}

fn crawl_page_record(
    ctx: &WorkerContext,
    task: &FrontierTask,
    final_url: &Url,
    status_code: Option<u16>,
    content_type: Option<String>,
    content_length: Option<u64>,
    response_time_ms: Option<u64>,
) -> CrawlPageRecord {
    CrawlPageRecord {
        job_id: ctx.job.job_id.clone(),
        site_id: ctx.job.site_id,
        url: final_url.to_string(),
        parent_url: task.parent.as_ref().map(|u| u.to_string()),
        status_code,
        content_type,
        content_length,
        response_time_ms,
        fetched_at: Utc::now().to_rfc3339(),
    }
}

async fn insert_crawl_page(ctx: &WorkerContext, record: CrawlPageRecord) -> StorageResult<()> {
    ctx.db.run(move |s| s.insert_crawl_page(&record)).await
}

/// Storage unavailability is fatal to the whole site job; everything else
/// stays worker-local
fn note_storage_error(ctx: &WorkerContext, error: &StorageError) {
    if matches!(error, StorageError::Unavailable(_)) {
        ctx.db_down.store(true, Ordering::Release);
        ctx.cancel.cancel();
    }
}
