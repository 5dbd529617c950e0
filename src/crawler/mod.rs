//! Crawler module: worker loop, per-site job runner, multi-site scheduler
//!
//! The pipeline is task-parallel at two layers: the scheduler caps
//! concurrent site jobs, and each site job scales its own worker pool
//! against frontier pressure. Workers are symmetric and pull work; no
//! partitioning of the URL space.

mod scheduler;
mod site_runner;
mod worker;

pub use scheduler::run_sites;
pub use site_runner::{run_site_job, SiteJobOutcome};
pub use worker::{JobInfo, Worker, WorkerContext};
