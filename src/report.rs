//! Report stream printed to stdout in CLI mode

use crate::crawler::SiteJobOutcome;
use crate::storage::JobStatus;
use crate::url::BlockReport;
use std::time::Duration;

pub fn print_banner(title: &str) {
    println!("\n=== {title} ===");
}

/// Per-rule-class counts of URLs the block classifier kept out of the
/// frontier, plus queue-capacity drops
pub fn print_blocked_report(site_id: i64, report: &BlockReport) {
    println!("\nBLOCKED URL REPORT (site {site_id})");
    for (rule, count) in report.snapshot() {
        println!("  {:<12} {count}", rule.label());
    }
    println!("  {:<12} {}", "QUEUE_FULL", report.queue_full_count());
    println!("  {:<12} {}", "TOTAL", report.total_blocked());
}

pub fn print_job_summary(
    site_url: &str,
    outcome: &SiteJobOutcome,
    duration: Duration,
    visited: usize,
) {
    println!("\n==============================");
    println!("CRAWL JOB SUMMARY");
    println!("==============================");
    println!("Site:           {site_url}");
    println!("Job:            {}", outcome.job_id);
    println!("Status:         {}", outcome.status);
    println!("Pages crawled:  {}", outcome.pages_crawled);
    println!("URLs visited:   {visited}");
    println!("Duration:       {:.2} s", duration.as_secs_f64());
    if let Some(error) = &outcome.error {
        println!("Error:          {error}");
    }
    println!("==============================");
}

/// Final run summary across all site jobs; returns the process exit code
pub fn print_run_summary(outcomes: &[SiteJobOutcome]) -> u8 {
    let completed = outcomes
        .iter()
        .filter(|o| o.status == JobStatus::Completed)
        .count();
    let failed = outcomes.len() - completed;

    println!("\n=== RUN SUMMARY: {completed} completed, {failed} failed ===");
    for outcome in outcomes {
        match &outcome.error {
            Some(error) => println!(
                "  site {:<6} {:<10} {}",
                outcome.site_id, outcome.status, error
            ),
            None => println!(
                "  site {:<6} {:<10} {} pages",
                outcome.site_id, outcome.status, outcome.pages_crawled
            ),
        }
    }

    if failed > 0 {
        1
    } else {
        0
    }
}
