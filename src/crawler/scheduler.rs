//! Multi-site scheduler
//!
//! Caps concurrent site jobs with a counting semaphore and composes the
//! per-site runners. The scheduler has no awareness of URLs; one site's
//! failure never affects another.

use crate::config::Config;
use crate::crawler::site_runner::{run_site_job, SiteJobOutcome};
use crate::render::RenderPool;
use crate::storage::{DbHandle, JobStatus, SiteRecord, SnapshotStore};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Runs the given sites under the configured parallelism cap and returns
/// one outcome per site, in input order.
pub async fn run_sites(
    config: Arc<Config>,
    db: Arc<DbHandle>,
    render: Arc<RenderPool>,
    snapshots: Arc<SnapshotStore>,
    sites: Vec<SiteRecord>,
    cancel: CancellationToken,
) -> Vec<SiteJobOutcome> {
    let semaphore = Arc::new(Semaphore::new(config.workers.max_parallel_sites));
    let mut handles = Vec::with_capacity(sites.len());

    for site in sites {
        let semaphore = Arc::clone(&semaphore);
        let config = Arc::clone(&config);
        let db = Arc::clone(&db);
        let render = Arc::clone(&render);
        let snapshots = Arc::clone(&snapshots);
        let cancel = cancel.clone();
        let site_id = site.site_id;

        let handle = tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    return SiteJobOutcome {
                        site_id,
                        job_id: String::new(),
                        status: JobStatus::Failed,
                        pages_crawled: 0,
                        error: Some("scheduler shut down".to_string()),
                    }
                }
            };
            run_site_job(config, db, render, snapshots, site, cancel).await
        });

        handles.push((site_id, handle));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for (site_id, handle) in handles {
        match handle.await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                tracing::error!("site job task for site {site_id} panicked: {e}");
                outcomes.push(SiteJobOutcome {
                    site_id,
                    job_id: String::new(),
                    status: JobStatus::Failed,
                    pages_crawled: 0,
                    error: Some(format!("job task panicked: {e}")),
                });
            }
        }
    }

    outcomes
}
