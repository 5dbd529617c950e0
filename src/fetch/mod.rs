//! HTTP fetch module
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - Response classification by status and content type
//! - Retry logic with exponential backoff for rate limiting
//! - Site-wide throttle pauses after 429/503 responses

mod client;
mod fetcher;

pub use client::build_http_client;
pub use fetcher::{FetchClass, FetchError, FetchOutcome, Fetcher, RetryPolicy, SiteThrottle};
