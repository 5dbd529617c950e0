//! Block classifier for frontier admission
//!
//! Deny rules keep taxonomy pages, pagination, static assets and
//! cart/sort query variants out of the crawl. Every hit is counted per
//! rule class for the end-of-job blocked URL report.

use regex::Regex;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use url::Url;

/// Rule classes a URL can be blocked under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockRule {
    TagPage,
    AuthorPage,
    Pagination,
    Assets,
    Static,
    Query,
    Recursion,
}

impl BlockRule {
    pub fn label(&self) -> &'static str {
        match self {
            Self::TagPage => "TAG_PAGE",
            Self::AuthorPage => "AUTHOR_PAGE",
            Self::Pagination => "PAGINATION",
            Self::Assets => "ASSETS",
            Self::Static => "STATIC",
            Self::Query => "QUERY",
            Self::Recursion => "RECURSION",
        }
    }

    pub fn all() -> [Self; 7] {
        [
            Self::TagPage,
            Self::AuthorPage,
            Self::Pagination,
            Self::Assets,
            Self::Static,
            Self::Query,
            Self::Recursion,
        ]
    }
}

impl std::fmt::Display for BlockRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// File extensions that identify static assets
const STATIC_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".svg", ".css", ".js", ".pdf", ".zip", ".rar", ".mp3",
    ".mp4", ".webm", ".woff", ".woff2", ".ttf", ".ico",
];

fn tag_page_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/(product-)?tag/").unwrap())
}

fn author_page_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/author/").unwrap())
}

fn pagination_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/page/\d+/?").unwrap())
}

fn assets_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/(assets|static)/").unwrap())
}

fn query_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|&)(orderby|sort|order|add-to-cart)=").unwrap())
}

/// Classifies a URL against the deny rules.
///
/// Returns the first matching rule class, or `None` when the URL is
/// admissible. Evaluation order: static extension, path rules, query
/// rules, recursion guard.
pub fn classify_block(url: &Url) -> Option<BlockRule> {
    let path = url.path().to_lowercase();

    if STATIC_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return Some(BlockRule::Static);
    }

    if tag_page_re().is_match(&path) {
        return Some(BlockRule::TagPage);
    }
    if author_page_re().is_match(&path) {
        return Some(BlockRule::AuthorPage);
    }
    if pagination_re().is_match(&path) {
        return Some(BlockRule::Pagination);
    }
    if assets_re().is_match(&path) {
        return Some(BlockRule::Assets);
    }

    if let Some(query) = url.query() {
        if query_re().is_match(&query.to_lowercase()) {
            return Some(BlockRule::Query);
        }
    }

    if is_recursion(&path) {
        return Some(BlockRule::Recursion);
    }

    None
}

/// Detects repeating path structures such as `/a/b/a/b` or a segment that
/// appears more than twice, which indicate crawler traps.
fn is_recursion(path: &str) -> bool {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() < 3 {
        return false;
    }

    let mut counts: HashMap<&str, u32> = HashMap::new();
    for segment in &segments {
        if segment.len() < 3 {
            continue;
        }
        let count = counts.entry(segment).or_insert(0);
        *count += 1;
        if *count > 2 {
            return true;
        }
    }

    // Consecutive repeating sequences of any length
    for n in 1..=segments.len() / 2 {
        for i in 0..=segments.len().saturating_sub(2 * n) {
            if segments[i..i + n] == segments[i + n..i + 2 * n] {
                return true;
            }
        }
    }

    false
}

/// Thread-safe per-rule block counters for one site job
#[derive(Debug, Default)]
pub struct BlockReport {
    counts: Mutex<HashMap<BlockRule, u64>>,
    dropped_full: Mutex<u64>,
}

impl BlockReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a blocked URL under its rule class
    pub fn record(&self, rule: BlockRule) {
        let mut counts = self.counts.lock().unwrap();
        *counts.entry(rule).or_insert(0) += 1;
    }

    /// Records a URL dropped because the frontier queue was full
    pub fn record_queue_full(&self) {
        *self.dropped_full.lock().unwrap() += 1;
    }

    /// Snapshot of all counters, in stable rule order
    pub fn snapshot(&self) -> Vec<(BlockRule, u64)> {
        let counts = self.counts.lock().unwrap();
        BlockRule::all()
            .iter()
            .map(|rule| (*rule, counts.get(rule).copied().unwrap_or(0)))
            .collect()
    }

    pub fn queue_full_count(&self) -> u64 {
        *self.dropped_full.lock().unwrap()
    }

    pub fn total_blocked(&self) -> u64 {
        self.counts.lock().unwrap().values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_pagination_blocked() {
        assert_eq!(
            classify_block(&url("https://x.test/page/42/")),
            Some(BlockRule::Pagination)
        );
        assert_eq!(
            classify_block(&url("https://x.test/blog/page/2")),
            Some(BlockRule::Pagination)
        );
    }

    #[test]
    fn test_static_extension_blocked() {
        assert_eq!(
            classify_block(&url("https://x.test/assets/img.png")),
            Some(BlockRule::Static)
        );
        assert_eq!(
            classify_block(&url("https://x.test/app.JS")),
            Some(BlockRule::Static)
        );
        assert_eq!(
            classify_block(&url("https://x.test/font.woff2")),
            Some(BlockRule::Static)
        );
    }

    #[test]
    fn test_assets_directory_blocked() {
        assert_eq!(
            classify_block(&url("https://x.test/static/page")),
            Some(BlockRule::Assets)
        );
    }

    #[test]
    fn test_tag_and_author_pages_blocked() {
        assert_eq!(
            classify_block(&url("https://x.test/tag/news/")),
            Some(BlockRule::TagPage)
        );
        assert_eq!(
            classify_block(&url("https://x.test/product-tag/shoes")),
            Some(BlockRule::TagPage)
        );
        assert_eq!(
            classify_block(&url("https://x.test/author/jane")),
            Some(BlockRule::AuthorPage)
        );
    }

    #[test]
    fn test_query_rules_blocked() {
        assert_eq!(
            classify_block(&url("https://x.test/shop?orderby=price")),
            Some(BlockRule::Query)
        );
        assert_eq!(
            classify_block(&url("https://x.test/shop?a=1&add-to-cart=5")),
            Some(BlockRule::Query)
        );
    }

    #[test]
    fn test_recursion_blocked() {
        assert_eq!(
            classify_block(&url("https://x.test/foo/bar/foo/bar")),
            Some(BlockRule::Recursion)
        );
        assert_eq!(
            classify_block(&url("https://x.test/dir/dir/dir")),
            Some(BlockRule::Recursion)
        );
    }

    #[test]
    fn test_normal_pages_allowed() {
        assert_eq!(classify_block(&url("https://x.test/")), None);
        assert_eq!(classify_block(&url("https://x.test/about")), None);
        assert_eq!(classify_block(&url("https://x.test/blog/post-1?id=3")), None);
    }

    #[test]
    fn test_report_counts() {
        let report = BlockReport::new();
        report.record(BlockRule::Static);
        report.record(BlockRule::Static);
        report.record(BlockRule::Pagination);
        report.record_queue_full();

        let snapshot = report.snapshot();
        let get = |rule| {
            snapshot
                .iter()
                .find(|(r, _)| *r == rule)
                .map(|(_, c)| *c)
                .unwrap()
        };
        assert_eq!(get(BlockRule::Static), 2);
        assert_eq!(get(BlockRule::Pagination), 1);
        assert_eq!(get(BlockRule::TagPage), 0);
        assert_eq!(report.total_blocked(), 3);
        assert_eq!(report.queue_full_count(), 1);
    }
}
