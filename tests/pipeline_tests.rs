//! End-to-end pipeline tests over a mock HTTP server
//!
//! These drive a whole site job (frontier, workers, scaling loop,
//! storage) against wiremock in each of the three crawl modes.

use sitevigil::config::{Config, CrawlMode};
use sitevigil::crawler::run_site_job;
use sitevigil::render::{DisabledRenderer, RenderCache, RenderPolicy, RenderPool};
use sitevigil::storage::{
    DbHandle, JobStatus, SiteRecord, SnapshotStore, SqliteStorage, Storage,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(mode: CrawlMode) -> Config {
    let mut config = Config::default();
    config.mode = mode;
    config.workers.min_workers = 2;
    config.workers.max_workers = 4;
    config.workers.crawl_delay = Duration::from_millis(1);
    config.fetch.request_timeout = Duration::from_secs(5);
    config
}

fn test_db() -> Arc<DbHandle> {
    let mut storage = SqliteStorage::new_in_memory().unwrap();
    // The job takes its SiteRecord as an argument; this row only satisfies
    // the crawl_jobs foreign key
    storage
        .upsert_site(&SiteRecord {
            site_id: 1,
            customer_id: 10,
            url: String::new(),
            enabled: true,
        })
        .unwrap();
    Arc::new(DbHandle::new(storage, 8, Duration::from_secs(5)))
}

fn test_render_pool() -> Arc<RenderPool> {
    Arc::new(RenderPool::new(
        Arc::new(DisabledRenderer),
        1,
        RenderCache::new(16, Duration::from_secs(3600)),
        RenderPolicy::default(),
    ))
}

async fn mount_page(server: &MockServer, route: &str, html: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html.to_string(), "text/html"))
        .mount(server)
        .await;
}

/// Three interlinked pages plus one dead link and one blocked asset
async fn mount_small_site(server: &MockServer) {
    mount_page(
        server,
        "/",
        r#"<html><body><main>
            <p>Welcome to the test site</p>
            <a href="/about">About</a>
            <a href="/contact">Contact</a>
            <a href="/assets/logo.png">Logo</a>
            <a href="https://elsewhere.example/out">External</a>
        </main></body></html>"#,
    )
    .await;
    mount_page(
        server,
        "/about",
        r#"<html><body><main>
            <p>About us</p>
            <a href="/">Home</a>
            <a href="/contact">Contact</a>
            <a href="/missing">Old page</a>
        </main></body></html>"#,
    )
    .await;
    mount_page(
        server,
        "/contact",
        r#"<html><body><main>
            <p>Contact page</p>
            <a href="/">Home</a>
        </main></body></html>"#,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
}

fn site_for(server: &MockServer) -> SiteRecord {
    SiteRecord {
        site_id: 1,
        customer_id: 10,
        url: server.uri(),
        enabled: true,
    }
}

#[tokio::test]
async fn crawl_mode_drains_and_records_pages() {
    let server = MockServer::start().await;
    mount_small_site(&server).await;

    let db = test_db();
    let snapshots = Arc::new(SnapshotStore::new(tempfile::tempdir().unwrap().keep()));

    let outcome = run_site_job(
        Arc::new(test_config(CrawlMode::Crawl)),
        Arc::clone(&db),
        test_render_pool(),
        snapshots,
        site_for(&server),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome.status, JobStatus::Completed, "error: {:?}", outcome.error);
    assert_eq!(outcome.pages_crawled, 3);

    let job_id = outcome.job_id.clone();
    let page_count = db
        .run(move |s| s.count_crawl_pages(&job_id))
        .await
        .unwrap();
    // Three successful pages plus the recorded 404
    assert_eq!(page_count, 4);

    let job_id = outcome.job_id.clone();
    let job = db.run(move |s| s.get_job(&job_id)).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.pages_crawled, 3);
    assert!(job.completed_at.is_some());
}

#[tokio::test]
async fn baseline_mode_persists_page_versions() {
    let server = MockServer::start().await;
    mount_small_site(&server).await;

    let db = test_db();
    let snapshot_root = tempfile::tempdir().unwrap().keep();
    let snapshots = Arc::new(SnapshotStore::new(snapshot_root.clone()));

    let outcome = run_site_job(
        Arc::new(test_config(CrawlMode::Baseline)),
        Arc::clone(&db),
        test_render_pool(),
        snapshots,
        site_for(&server),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome.status, JobStatus::Completed, "error: {:?}", outcome.error);
    assert_eq!(outcome.pages_crawled, 3);

    let baselines = db.run(|s| s.count_baselines(1)).await.unwrap();
    assert_eq!(baselines, 3);

    // Snapshot tree: baselines/{customer}/{site_folder}/ with index files
    let customer_dir = snapshot_root.join("10");
    assert!(customer_dir.join("index.json").exists());
    let site_dir = customer_dir.join("1");
    assert!(site_dir.join("index.json").exists());
    assert!(site_dir.join("1001.html").exists());
}

#[tokio::test]
async fn compare_mode_against_own_baseline_is_clean() {
    let server = MockServer::start().await;
    mount_small_site(&server).await;

    let db = test_db();
    let snapshot_root = tempfile::tempdir().unwrap().keep();

    // First pass records the baselines
    let outcome = run_site_job(
        Arc::new(test_config(CrawlMode::Baseline)),
        Arc::clone(&db),
        test_render_pool(),
        Arc::new(SnapshotStore::new(snapshot_root.clone())),
        site_for(&server),
        CancellationToken::new(),
    )
    .await;
    assert_eq!(outcome.status, JobStatus::Completed, "error: {:?}", outcome.error);

    // Second pass compares unchanged content against them
    let outcome = run_site_job(
        Arc::new(test_config(CrawlMode::Compare)),
        Arc::clone(&db),
        test_render_pool(),
        Arc::new(SnapshotStore::new(snapshot_root)),
        site_for(&server),
        CancellationToken::new(),
    )
    .await;
    assert_eq!(outcome.status, JobStatus::Completed, "error: {:?}", outcome.error);

    let total = db.run(|s| s.count_diff_evidence(1)).await.unwrap();
    assert_eq!(total, 3);
    let clean = db
        .run(|s| s.count_diff_evidence_by_status(1, "CLEAN"))
        .await
        .unwrap();
    assert_eq!(clean, 3);
}

#[tokio::test]
async fn compare_mode_without_baseline_fails_per_url() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        "<html><body><main><p>Lonely page</p></main></body></html>",
    )
    .await;

    let db = test_db();

    let outcome = run_site_job(
        Arc::new(test_config(CrawlMode::Compare)),
        Arc::clone(&db),
        test_render_pool(),
        Arc::new(SnapshotStore::new(tempfile::tempdir().unwrap().keep())),
        site_for(&server),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome.status, JobStatus::Completed, "error: {:?}", outcome.error);

    let failed = db
        .run(|s| s.count_diff_evidence_by_status(1, "FAILED"))
        .await
        .unwrap();
    assert_eq!(failed, 1);
}

#[tokio::test]
async fn cancelled_job_is_marked_failed() {
    let server = MockServer::start().await;
    mount_small_site(&server).await;

    let db = test_db();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = run_site_job(
        Arc::new(test_config(CrawlMode::Crawl)),
        Arc::clone(&db),
        test_render_pool(),
        Arc::new(SnapshotStore::new(tempfile::tempdir().unwrap().keep())),
        site_for(&server),
        cancel,
    )
    .await;

    assert_eq!(outcome.status, JobStatus::Failed);
    assert_eq!(outcome.error.as_deref(), Some("cancelled"));

    let job_id = outcome.job_id.clone();
    let job = db.run(move |s| s.get_job(&job_id)).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_msg.as_deref(), Some("cancelled"));
}
