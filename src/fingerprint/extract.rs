//! URL extraction from HTML documents

use crate::url::repair_scheme;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Element/attribute pairs that carry outbound references
const LINK_SOURCES: &[(&str, &str)] = &[
    ("a[href]", "href"),
    ("img[src]", "src"),
    ("link[href]", "href"),
    ("script[src]", "src"),
    ("iframe[src]", "src"),
];

/// Extracts absolute URLs referenced by a page.
///
/// Relative references are resolved against `base`; the malformed-scheme
/// repair is applied first. Fragment-only references and non-web schemes
/// are discarded; the result is deduplicated, preserving document order.
pub fn extract_urls(html: &str, base: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    let mut seen: HashSet<String> = HashSet::new();
    let mut urls: Vec<Url> = Vec::new();

    for (selector_str, attr) in LINK_SOURCES {
        let selector = match Selector::parse(selector_str) {
            Ok(s) => s,
            Err(_) => continue,
        };

        for element in document.select(&selector) {
            let Some(raw) = element.value().attr(attr) else {
                continue;
            };
            if let Some(resolved) = resolve_reference(raw, base) {
                if seen.insert(resolved.to_string()) {
                    urls.push(resolved);
                }
            }
        }
    }

    urls
}

/// Extracts the resolved `script[src]` references of a page.
///
/// These feed the comparator's script-injection indicators, so they are
/// returned sorted for set comparison.
pub fn extract_script_srcs(html: &str, base: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut srcs: HashSet<String> = HashSet::new();

    if let Ok(selector) = Selector::parse("script[src]") {
        for element in document.select(&selector) {
            if let Some(raw) = element.value().attr("src") {
                if let Some(resolved) = resolve_reference(raw, base) {
                    srcs.insert(resolved.to_string());
                }
            }
        }
    }

    let mut out: Vec<String> = srcs.into_iter().collect();
    out.sort_unstable();
    out
}

/// Resolves one raw reference against the base URL.
///
/// Returns None for references that can never become crawlable pages:
/// empty strings, fragment-only anchors, non-web schemes, unparseable
/// input.
fn resolve_reference(raw: &str, base: &Url) -> Option<Url> {
    let raw = raw.trim();

    if raw.is_empty() || raw.starts_with('#') {
        return None;
    }

    let lower = raw.to_ascii_lowercase();
    if lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
    {
        return None;
    }

    let repaired = repair_scheme(raw);
    let mut resolved = base.join(&repaired).ok()?;

    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        return None;
    }

    resolved.set_fragment(None);
    Some(resolved)
}
