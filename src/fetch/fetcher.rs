//! HTTP GET with classification and retry
//!
//! Retry policy:
//!
//! | Condition                  | Action                             |
//! |----------------------------|------------------------------------|
//! | HTTP 429, connect/DNS fail | Backoff 5s/10s/20s, max 3 retries  |
//! | Timeout                    | No retry, recorded as timeout      |
//! | Other 4xx                  | No retry                           |
//! | 5xx (503 included)         | 2 retries at 5s/10s                |
//!
//! Both 429 and 503 set the site-wide throttle pause; only the 429 gets
//! the longer rate-limit retry budget. Retries never re-enter the
//! frontier; they are internal to a single dequeue.

use reqwest::{Client, StatusCode};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

/// Content types whose bodies are kept
const ACCEPTED_TYPES: &[&str] = &["text/html", "application/xhtml+xml", "application/json"];

/// Classification of a completed HTTP exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchClass {
    /// 2xx with an accepted content type; body returned
    Ok,
    /// 2xx with a content type the crawler ignores; body discarded
    IgnoredType,
    /// 4xx
    ClientError,
    /// 5xx after retries
    ServerError,
}

impl FetchClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::IgnoredType => "ignored_type",
            Self::ClientError => "client_error",
            Self::ServerError => "server_error",
        }
    }
}

/// Errors that prevented any classified HTTP exchange
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },
}

/// Result of a completed fetch
#[derive(Debug)]
pub struct FetchOutcome {
    /// Effective URL after redirects
    pub final_url: Url,
    pub status: u16,
    pub content_type: String,
    pub elapsed_ms: u64,
    /// Present only when `class` is `Ok`
    pub body: Option<Vec<u8>>,
    pub class: FetchClass,
    /// Body carries a meta-refresh or scripted redirect
    pub soft_redirect: bool,
}

/// Retry timing parameters
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after a 429 or connect failure (backoff 5s/10s/20s)
    pub rate_limit_attempts: u32,
    /// Additional attempts after the first 5xx
    pub server_error_retries: u32,
    /// First backoff delay; doubles per attempt
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rate_limit_attempts: 3,
            server_error_retries: 2,
            base_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff: `base_delay * 2^attempt`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.pow(attempt)
    }
}

/// Site-wide pause shared by all workers of one site.
///
/// A 429 or 503 from any worker pauses the whole site briefly so a single
/// hot endpoint cannot drag every worker into the same rate limit.
#[derive(Debug, Default)]
pub struct SiteThrottle {
    paused_until: Mutex<Option<Instant>>,
}

impl SiteThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extends the site-wide pause; never shortens an existing one
    pub fn pause_for(&self, duration: Duration) {
        let until = Instant::now() + duration;
        let mut guard = self.paused_until.lock().unwrap();
        match *guard {
            Some(existing) if existing >= until => {}
            _ => *guard = Some(until),
        }
    }

    /// Remaining pause, if any
    pub fn remaining(&self) -> Option<Duration> {
        let guard = self.paused_until.lock().unwrap();
        guard.and_then(|until| until.checked_duration_since(Instant::now()))
    }

    /// Sleeps out any active pause
    pub async fn wait_if_paused(&self) {
        if let Some(remaining) = self.remaining() {
            tracing::info!("site paused for {:.1}s after rate limiting", remaining.as_secs_f64());
            tokio::time::sleep(remaining).await;
        }
    }
}

/// HTTP fetcher bound to one site's client and throttle
pub struct Fetcher {
    client: Client,
    policy: RetryPolicy,
    throttle: std::sync::Arc<SiteThrottle>,
}

impl Fetcher {
    pub fn new(client: Client, policy: RetryPolicy, throttle: std::sync::Arc<SiteThrottle>) -> Self {
        Self {
            client,
            policy,
            throttle,
        }
    }

    pub fn throttle(&self) -> &SiteThrottle {
        &self.throttle
    }

    /// Fetches a URL, applying the retry policy.
    ///
    /// The returned outcome owns the body bytes; nothing is persisted here.
    pub async fn fetch(&self, url: &Url, referer: Option<&Url>) -> Result<FetchOutcome, FetchError> {
        let mut rate_limit_attempt: u32 = 0;
        let mut server_error_attempt: u32 = 0;

        loop {
            self.throttle.wait_if_paused().await;

            let started = Instant::now();
            let mut request = self.client.get(url.clone());
            if let Some(referer) = referer {
                request = request.header(reqwest::header::REFERER, referer.as_str());
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) if e.is_timeout() => {
                    return Err(FetchError::Timeout {
                        url: url.to_string(),
                    });
                }
                Err(e) if e.is_connect() => {
                    // Connection refused / reset / DNS failure
                    if rate_limit_attempt < self.policy.rate_limit_attempts {
                        let delay = self.policy.delay_for_attempt(rate_limit_attempt);
                        tracing::debug!("connect error for {url}, retrying in {delay:?}");
                        tokio::time::sleep(delay).await;
                        rate_limit_attempt += 1;
                        continue;
                    }
                    return Err(FetchError::Network {
                        url: url.to_string(),
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    return Err(FetchError::Network {
                        url: url.to_string(),
                        message: e.to_string(),
                    });
                }
            };

            let status = response.status();
            let final_url = response.url().clone();
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_lowercase();

            if status == StatusCode::TOO_MANY_REQUESTS {
                self.throttle.pause_for(self.policy.base_delay);
                if rate_limit_attempt < self.policy.rate_limit_attempts {
                    let delay = self.policy.delay_for_attempt(rate_limit_attempt);
                    tracing::warn!(
                        "429 for {url}, retry {}/{} in {delay:?}",
                        rate_limit_attempt + 1,
                        self.policy.rate_limit_attempts
                    );
                    tokio::time::sleep(delay).await;
                    rate_limit_attempt += 1;
                    continue;
                }
            }

            if status.is_server_error() {
                // A 503 pauses the whole site like a 429 does, but its
                // retry budget is the ordinary 5xx one
                if status == StatusCode::SERVICE_UNAVAILABLE {
                    self.throttle.pause_for(self.policy.base_delay);
                }
                if server_error_attempt < self.policy.server_error_retries {
                    let delay = self.policy.delay_for_attempt(server_error_attempt);
                    tracing::debug!("{} for {url}, retrying in {delay:?}", status.as_u16());
                    tokio::time::sleep(delay).await;
                    server_error_attempt += 1;
                    continue;
                }
            }

            let elapsed_ms = started.elapsed().as_millis() as u64;

            if status.is_success() {
                let accepted = ACCEPTED_TYPES.iter().any(|t| content_type.contains(t));
                if !accepted {
                    return Ok(FetchOutcome {
                        final_url,
                        status: status.as_u16(),
                        content_type,
                        elapsed_ms,
                        body: None,
                        class: FetchClass::IgnoredType,
                        soft_redirect: false,
                    });
                }

                let body = response
                    .bytes()
                    .await
                    .map_err(|e| FetchError::Network {
                        url: url.to_string(),
                        message: e.to_string(),
                    })?
                    .to_vec();
                let soft_redirect = is_soft_redirect(&body);

                return Ok(FetchOutcome {
                    final_url,
                    status: status.as_u16(),
                    content_type,
                    elapsed_ms,
                    body: Some(body),
                    class: FetchClass::Ok,
                    soft_redirect,
                });
            }

            let class = if status.is_client_error() {
                FetchClass::ClientError
            } else {
                FetchClass::ServerError
            };

            return Ok(FetchOutcome {
                final_url,
                status: status.as_u16(),
                content_type,
                elapsed_ms,
                body: None,
                class,
                soft_redirect: false,
            });
        }
    }
}

/// Detects meta-refresh and scripted redirects, plus the Sucuri anti-bot
/// challenge page, in a 2xx body
fn is_soft_redirect(body: &[u8]) -> bool {
    let probe_len = body.len().min(16 * 1024);
    let head = String::from_utf8_lossy(&body[..probe_len]).to_lowercase();

    head.contains("http-equiv=\"refresh\"")
        || head.contains("window.location")
        || head.contains("sucuri_cloudproxy_js")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(20));
    }

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.rate_limit_attempts, 3);
        assert_eq!(policy.server_error_retries, 2);
        assert_eq!(policy.base_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_fetch_class_labels() {
        assert_eq!(FetchClass::Ok.as_str(), "ok");
        assert_eq!(FetchClass::IgnoredType.as_str(), "ignored_type");
        assert_eq!(FetchClass::ClientError.as_str(), "client_error");
        assert_eq!(FetchClass::ServerError.as_str(), "server_error");
    }

    #[test]
    fn test_throttle_pause_and_expiry() {
        let throttle = SiteThrottle::new();
        assert!(throttle.remaining().is_none());

        throttle.pause_for(Duration::from_secs(30));
        let remaining = throttle.remaining().unwrap();
        assert!(remaining <= Duration::from_secs(30));
        assert!(remaining > Duration::from_secs(29));

        // A shorter pause never shrinks the active one
        throttle.pause_for(Duration::from_secs(1));
        assert!(throttle.remaining().unwrap() > Duration::from_secs(20));
    }

    #[test]
    fn test_soft_redirect_detection() {
        assert!(is_soft_redirect(
            b"<html><head><meta http-equiv=\"refresh\" content=\"0;url=/x\"></head></html>"
        ));
        assert!(is_soft_redirect(b"<script>window.location = '/next';</script>"));
        assert!(!is_soft_redirect(b"<html><body><p>plain page</p></body></html>"));
    }
}
