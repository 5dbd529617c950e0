//! Headless render module
//!
//! The browser itself is an external service: this module owns only its
//! contract (the [`Renderer`] trait with structured errors), a bounded
//! context pool, the render cache, and the heuristic that decides when a
//! page needs JavaScript rendering at all.

mod cache;
mod detect;

pub use cache::RenderCache;
pub use detect::needs_js_rendering;

use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use url::Url;

/// Render wait trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    Load,
    DomContentLoaded,
    NetworkIdle,
}

/// Parameters for one render invocation
#[derive(Debug, Clone)]
pub struct RenderPolicy {
    pub wait_until: WaitUntil,
    pub goto_timeout: Duration,
    /// Quiet period after the wait trigger before the DOM is serialized
    pub stability: Duration,
    /// Extra wait for client-side hydration
    pub hydration_wait: Duration,
    pub viewport: (u32, u32),
}

impl Default for RenderPolicy {
    fn default() -> Self {
        Self {
            wait_until: WaitUntil::NetworkIdle,
            goto_timeout: Duration::from_secs(30),
            stability: Duration::from_secs(5),
            hydration_wait: Duration::from_secs(8),
            viewport: (1024, 768),
        }
    }
}

/// Serialized DOM after the wait trigger and stability pause
#[derive(Debug, Clone)]
pub struct RenderedArtifact {
    pub body: String,
    pub warnings: Vec<String>,
    pub elapsed_ms: u64,
}

/// Structured render failures; never panics, never free-form exceptions
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Render timeout for {url}")]
    Timeout { url: String },

    #[error("Render failed for {url}: {message}")]
    Failed { url: String, message: String },

    #[error("Content type not renderable for {url}: {content_type}")]
    IneligibleType { url: String, content_type: String },
}

/// Contract for the headless browser backend.
///
/// Each call renders one URL in an isolated context: no persistent
/// cookies, no localStorage, no session reuse. Implementations block;
/// the pool moves them off the async runtime.
pub trait Renderer: Send + Sync {
    fn render(&self, url: &Url, policy: &RenderPolicy) -> Result<RenderedArtifact, RenderError>;
}

/// Backend used when no headless browser is wired up.
///
/// Every render fails with a structured error, which the worker treats as
/// a fallback to the fetched body.
pub struct DisabledRenderer;

impl Renderer for DisabledRenderer {
    fn render(&self, url: &Url, _policy: &RenderPolicy) -> Result<RenderedArtifact, RenderError> {
        Err(RenderError::Failed {
            url: url.to_string(),
            message: "no headless rendering backend configured".to_string(),
        })
    }
}

/// Bounded pool of browser contexts with a cache in front.
///
/// A cache hit short-circuits the render entirely; misses acquire a
/// context permit and run the blocking backend off the async runtime.
pub struct RenderPool {
    renderer: Arc<dyn Renderer>,
    permits: Arc<Semaphore>,
    cache: Mutex<RenderCache>,
    policy: RenderPolicy,
}

impl RenderPool {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        contexts: usize,
        cache: RenderCache,
        policy: RenderPolicy,
    ) -> Self {
        Self {
            renderer,
            permits: Arc::new(Semaphore::new(contexts)),
            cache: Mutex::new(cache),
            policy,
        }
    }

    /// Renders a canonical URL, consulting the cache first
    pub async fn render(&self, url: &Url) -> Result<RenderedArtifact, RenderError> {
        if let Some(body) = self.cache.lock().unwrap().get(url) {
            tracing::debug!("render cache hit for {url}");
            return Ok(RenderedArtifact {
                body,
                warnings: Vec::new(),
                elapsed_ms: 0,
            });
        }

        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RenderError::Failed {
                url: url.to_string(),
                message: "render pool closed".to_string(),
            })?;

        let renderer = Arc::clone(&self.renderer);
        let policy = self.policy.clone();
        let target = url.clone();

        let result = tokio::task::spawn_blocking(move || renderer.render(&target, &policy))
            .await
            .map_err(|e| RenderError::Failed {
                url: url.to_string(),
                message: format!("render task panicked: {e}"),
            })?;

        if let Ok(artifact) = &result {
            self.cache.lock().unwrap().put(url, &artifact.body);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRenderer {
        calls: AtomicUsize,
    }

    impl Renderer for CountingRenderer {
        fn render(&self, _url: &Url, _policy: &RenderPolicy) -> Result<RenderedArtifact, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RenderedArtifact {
                body: "<html><body><p>rendered</p></body></html>".to_string(),
                warnings: Vec::new(),
                elapsed_ms: 12,
            })
        }
    }

    #[test]
    fn test_policy_defaults() {
        let policy = RenderPolicy::default();
        assert_eq!(policy.wait_until, WaitUntil::NetworkIdle);
        assert_eq!(policy.goto_timeout, Duration::from_secs(30));
        assert_eq!(policy.stability, Duration::from_secs(5));
        assert_eq!(policy.hydration_wait, Duration::from_secs(8));
    }

    #[test]
    fn test_disabled_renderer_fails_structurally() {
        let renderer = DisabledRenderer;
        let url = Url::parse("https://x.test/").unwrap();
        let result = renderer.render(&url, &RenderPolicy::default());
        assert!(matches!(result, Err(RenderError::Failed { .. })));
    }

    #[tokio::test]
    async fn test_pool_caches_renders() {
        let renderer = Arc::new(CountingRenderer {
            calls: AtomicUsize::new(0),
        });
        let pool = RenderPool::new(
            Arc::clone(&renderer) as Arc<dyn Renderer>,
            2,
            RenderCache::new(16, Duration::from_secs(3600)),
            RenderPolicy::default(),
        );
        let url = Url::parse("https://x.test/app").unwrap();

        let first = pool.render(&url).await.unwrap();
        let second = pool.render(&url).await.unwrap();

        assert_eq!(first.body, second.body);
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
    }
}
