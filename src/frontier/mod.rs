//! Per-site crawl frontier
//!
//! One mutex guards the task queue and both membership sets; deduplication
//! is strictly by canonical URL, and a URL is in exactly one state at any
//! moment. Workers block on [`Frontier::dequeue`] until a task arrives or
//! the frontier is closed.

use crate::url::{canonicalize_in_scope, classify_block, BlockReport, BlockRule, SeedScope};
use crate::UrlError;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use tokio::sync::Notify;
use url::Url;

/// Default bound on the task queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// A unit of work owned by exactly one worker at a time
#[derive(Debug, Clone)]
pub struct FrontierTask {
    pub url: Url,
    pub parent: Option<Url>,
    pub depth: u32,
}

/// Outcome of an enqueue attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Task appended to the queue
    Queued,
    /// Canonical URL already queued, in progress, or visited
    Duplicate,
    /// Denied by the block classifier; URL marked visited
    Blocked(BlockRule),
    /// Host outside the seed domain scope
    OutOfScope,
    /// Unparseable or non-web URL
    Invalid,
    /// Queue at capacity; dropped and counted
    QueueFull,
}

#[derive(Debug, Default)]
struct FrontierState {
    queue: VecDeque<FrontierTask>,
    queued: HashSet<String>,
    in_progress: HashSet<String>,
    visited: HashSet<String>,
    closed: bool,
}

/// Thread-safe per-site URL frontier with dedup and in-flight tracking
pub struct Frontier {
    state: Mutex<FrontierState>,
    notify: Notify,
    capacity: usize,
    scope: SeedScope,
    report: BlockReport,
}

impl Frontier {
    pub fn new(scope: SeedScope) -> Self {
        Self::with_capacity(scope, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(scope: SeedScope, capacity: usize) -> Self {
        Self {
            state: Mutex::new(FrontierState::default()),
            notify: Notify::new(),
            capacity,
            scope,
            report: BlockReport::new(),
        }
    }

    /// Canonicalizes and enqueues a raw URL.
    ///
    /// Blocked URLs are marked visited immediately so they are never
    /// reconsidered; duplicates are detected against the queue, the
    /// in-progress set and the visited set.
    pub fn enqueue(&self, raw: &str, parent: Option<&Url>, depth: u32) -> EnqueueOutcome {
        let url = match canonicalize_in_scope(raw, &self.scope) {
            Ok(url) => url,
            Err(UrlError::OutOfScope { .. }) => return EnqueueOutcome::OutOfScope,
            Err(UrlError::Invalid(_)) => return EnqueueOutcome::Invalid,
        };

        let key = url.to_string();
        let mut state = self.state.lock().unwrap();

        if state.closed {
            return EnqueueOutcome::Duplicate;
        }

        if state.visited.contains(&key)
            || state.in_progress.contains(&key)
            || state.queued.contains(&key)
        {
            return EnqueueOutcome::Duplicate;
        }

        if let Some(rule) = classify_block(&url) {
            state.visited.insert(key);
            self.report.record(rule);
            return EnqueueOutcome::Blocked(rule);
        }

        if state.queue.len() >= self.capacity {
            self.report.record_queue_full();
            return EnqueueOutcome::QueueFull;
        }

        state.queued.insert(key);
        state.queue.push_back(FrontierTask {
            url,
            parent: parent.cloned(),
            depth,
        });
        drop(state);

        self.notify.notify_one();
        EnqueueOutcome::Queued
    }

    /// Blocks until a task is available or the frontier is closed.
    ///
    /// The dequeued URL moves atomically into the in-progress set; `None`
    /// means the frontier has been closed.
    pub async fn dequeue(&self) -> Option<FrontierTask> {
        loop {
            {
                let mut state = self.state.lock().unwrap();
                if let Some(task) = state.queue.pop_front() {
                    let key = task.url.to_string();
                    state.queued.remove(&key);
                    state.in_progress.insert(key);
                    // Cascade the wakeup so a permit consumed by an
                    // abandoned waiter cannot strand queued work
                    if !state.queue.is_empty() {
                        self.notify.notify_one();
                    }
                    return Some(task);
                }
                if state.closed {
                    // Propagate the close to the next sleeping worker
                    self.notify.notify_one();
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Removes a URL from in-progress and records it as visited
    pub fn mark_done(&self, url: &Url) {
        let mut state = self.state.lock().unwrap();
        let key = url.to_string();
        state.in_progress.remove(&key);
        state.visited.insert(key);
    }

    /// Same transition as `mark_done`; failed URLs are terminal too
    pub fn mark_failed(&self, url: &Url) {
        self.mark_done(url);
    }

    /// Retires an in-progress URL without fetching it: marks it visited
    /// and counts the block rule that denied it
    pub fn mark_blocked(&self, url: &Url, rule: BlockRule) {
        {
            let mut state = self.state.lock().unwrap();
            let key = url.to_string();
            state.in_progress.remove(&key);
            state.visited.insert(key);
        }
        self.report.record(rule);
    }

    /// Moves an in-progress task back to the head of the queue.
    ///
    /// Retry budgeting lives with the caller; the frontier only performs
    /// the state transition. Returns false when the task was not in
    /// progress or the frontier is closed.
    pub fn mark_retry(&self, task: FrontierTask) -> bool {
        let key = task.url.to_string();
        let mut state = self.state.lock().unwrap();

        if state.closed || !state.in_progress.remove(&key) {
            return false;
        }

        state.queued.insert(key);
        state.queue.push_front(task);
        drop(state);

        self.notify.notify_one();
        true
    }

    /// Queued plus in-progress count; zero with all workers idle means
    /// the site has drained
    pub fn pending_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.queue.len() + state.in_progress.len()
    }

    pub fn visited_count(&self) -> usize {
        self.state.lock().unwrap().visited.len()
    }

    /// Closes the frontier; all blocked and future dequeues return `None`
    pub fn close(&self) {
        self.state.lock().unwrap().closed = true;
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// Per-rule block counters for the end-of-job report
    pub fn block_report(&self) -> &BlockReport {
        &self.report
    }
}
