//! SiteVigil command-line entry point

use clap::Parser;
use sitevigil::config::Config;
use sitevigil::crawler::run_sites;
use sitevigil::render::{DisabledRenderer, RenderCache, RenderPolicy, RenderPool};
use sitevigil::report;
use sitevigil::storage::{DbHandle, SnapshotStore, SqliteStorage, Storage};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// SiteVigil: defacement-detection crawler
///
/// Crawls the enabled sites in CRAWL, BASELINE or COMPARE mode (set via
/// the CRAWL_MODE environment variable) and records results in the
/// relational store.
#[derive(Parser, Debug)]
#[command(name = "sitevigil")]
#[command(version)]
#[command(about = "Defacement-detection crawler", long_about = None)]
struct Cli {
    /// Restrict the run to one site id
    #[arg(long = "siteid")]
    site_id: Option<i64>,

    /// Restrict the run to one customer id
    #[arg(long = "custid")]
    customer_id: Option<i64>,

    /// Crawl multiple sites concurrently
    #[arg(long)]
    parallel: bool,

    /// Override the concurrent-site cap (implies --parallel)
    #[arg(long = "max_parallel_sites")]
    max_parallel_sites: Option<usize>,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(2);
        }
    };

    if let Some(cap) = cli.max_parallel_sites {
        if cap == 0 {
            eprintln!("configuration error: --max_parallel_sites must be at least 1");
            return ExitCode::from(2);
        }
        config.workers.max_parallel_sites = cap;
    } else if !cli.parallel {
        config.workers.max_parallel_sites = 1;
    }

    tracing::info!(
        "mode {}, up to {} parallel sites",
        config.mode,
        config.workers.max_parallel_sites
    );

    let storage = match SqliteStorage::new(&config.db.path) {
        Ok(storage) => storage,
        Err(e) => {
            eprintln!("failed to open database {}: {e}", config.db.path.display());
            return ExitCode::from(1);
        }
    };
    let db = Arc::new(DbHandle::new(
        storage,
        config.db.pool_size,
        config.db.acquire_timeout,
    ));

    let site_filter = cli.site_id;
    let customer_filter = cli.customer_id;
    let sites = match db
        .run(move |s| s.list_enabled_sites(site_filter, customer_filter))
        .await
    {
        Ok(sites) => sites,
        Err(e) => {
            eprintln!("failed to load sites: {e}");
            return ExitCode::from(1);
        }
    };

    if sites.is_empty() {
        println!("no enabled sites match the given filters");
        return ExitCode::SUCCESS;
    }

    let render_policy = RenderPolicy {
        goto_timeout: config.render.goto_timeout,
        hydration_wait: config.render.hydration_wait,
        stability: config.render.stability,
        ..RenderPolicy::default()
    };
    let render = Arc::new(RenderPool::new(
        Arc::new(DisabledRenderer),
        config.render.contexts,
        RenderCache::new(config.render.cache_capacity, config.render.cache_ttl),
        render_policy,
    ));

    let snapshots = Arc::new(SnapshotStore::new(config.snapshots.root.clone()));

    // Ctrl-C cancels all site jobs; workers drain their current URL first
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling site jobs");
                cancel.cancel();
            }
        });
    }

    let outcomes = run_sites(
        Arc::new(config),
        db,
        render,
        snapshots,
        sites,
        cancel,
    )
    .await;

    ExitCode::from(report::print_run_summary(&outcomes))
}

/// Sets up the tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sitevigil=info,warn"),
            1 => EnvFilter::new("sitevigil=debug,info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}
