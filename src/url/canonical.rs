use crate::{UrlError, UrlResult};
use std::borrow::Cow;
use url::form_urlencoded;
use url::Url;

use super::domain::SeedScope;

/// Query parameters removed during canonicalization
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "ref",
    "session",
    "sessionid",
    "sid",
    "orderby",
    "sort",
    "order",
    "add-to-cart",
];

/// Canonicalizes a raw URL string.
///
/// The canonical URL is the sole identity of a page: it is computed before
/// any enqueue, lookup, hash or persistence. The transformation is
/// deterministic and idempotent.
///
/// # Canonicalization Steps
///
/// 1. Repair malformed `scheme:host` forms (missing `//`)
/// 2. Parse; reject non-web schemes and bare fragments
/// 3. Force https, lowercase the host, strip a leading `www.`
/// 4. Remove the fragment
/// 5. Remove tracking query parameters, sort the rest by key then value
/// 6. Normalize the path (collapse `//`, resolve `.`/`..`, percent-decode
///    unreserved characters)
/// 7. Remove the trailing slash unless the path is exactly `/`
///
/// # Examples
///
/// ```
/// use sitevigil::url::canonicalize;
///
/// let url = canonicalize("HTTPS://WWW.Example.com/Blog/?utm_source=tw&id=1#top").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/Blog?id=1");
/// ```
pub fn canonicalize(raw: &str) -> UrlResult<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Err(UrlError::Invalid(raw.to_string()));
    }

    let repaired = repair_scheme(trimmed);

    let mut url = Url::parse(&repaired).map_err(|_| UrlError::Invalid(raw.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        _ => return Err(UrlError::Invalid(raw.to_string())),
    }

    let host = url
        .host_str()
        .ok_or_else(|| UrlError::Invalid(raw.to_string()))?
        .to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    if host.is_empty() {
        return Err(UrlError::Invalid(raw.to_string()));
    }
    url.set_host(Some(&host))
        .map_err(|_| UrlError::Invalid(raw.to_string()))?;

    // Domain hosts are upgraded to https; IP literals and localhost keep
    // their scheme so internal probe targets stay reachable
    let upgrade = matches!(url.host(), Some(::url::Host::Domain(_))) && host != "localhost";
    if upgrade {
        // set_scheme only fails for cross-family changes, never http->https
        let _ = url.set_scheme("https");
    }

    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(params)
                .finish();
            url.set_query(Some(&query));
        }
    }

    let path = normalize_path(url.path());
    url.set_path(&path);

    Ok(url)
}

/// Canonicalizes a raw URL and enforces the seed-domain scope.
///
/// Bare-host and `www.`-prefixed variants of the seed domain are both in
/// scope; anything else fails with `OutOfScope`.
pub fn canonicalize_in_scope(raw: &str, scope: &SeedScope) -> UrlResult<Url> {
    let url = canonicalize(raw)?;
    let host = url
        .host_str()
        .ok_or_else(|| UrlError::Invalid(raw.to_string()))?;

    if !scope.contains(host) {
        return Err(UrlError::OutOfScope {
            url: url.to_string(),
            seed: scope.seed_domain().to_string(),
        });
    }

    Ok(url)
}

/// Repairs malformed schemes of the form `https:host/...` (missing `//`)
/// by inserting `//` after the scheme's colon when the next character is
/// alphanumeric.
pub fn repair_scheme(raw: &str) -> Cow<'_, str> {
    for scheme in ["https:", "http:"] {
        if let Some(rest) = strip_prefix_ignore_case(raw, scheme) {
            if rest
                .chars()
                .next()
                .map(|c| c.is_ascii_alphanumeric())
                .unwrap_or(false)
            {
                return Cow::Owned(format!("{}//{}", &raw[..scheme.len()], rest));
            }
            return Cow::Borrowed(raw);
        }
    }
    Cow::Borrowed(raw)
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

/// Normalizes a URL path: collapses repeated slashes, resolves `.` and `..`
/// segments, percent-decodes unreserved characters, and strips the trailing
/// slash (except for the root path).
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<String> = Vec::new();

    for segment in path.split('/') {
        match segment {
            // Empty segments come from repeated slashes
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(decode_unreserved(segment)),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", segments.join("/"))
}

/// Percent-decodes sequences whose decoded byte is an unreserved character
/// (ALPHA / DIGIT / `-` / `.` / `_` / `~`); all other sequences are kept
/// encoded.
fn decode_unreserved(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out = String::with_capacity(segment.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = &segment[i + 1..i + 3];
            if let Ok(value) = u8::from_str_radix(hex, 16) {
                if value.is_ascii_alphanumeric() || matches!(value, b'-' | b'.' | b'_' | b'~') {
                    out.push(value as char);
                    i += 3;
                    continue;
                }
            }
        }
        // Keep the raw byte; paths are valid UTF-8 coming from the Url type
        let ch_len = utf8_len(bytes[i]);
        out.push_str(&segment[i..i + ch_len]);
        i += ch_len;
    }

    out
}

fn utf8_len(first_byte: u8) -> usize {
    match first_byte {
        b if b < 0x80 => 1,
        b if b >= 0xF0 => 4,
        b if b >= 0xE0 => 3,
        _ => 2,
    }
}

/// Filters out tracking parameters and sorts the remainder by key, then value
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    params.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    params
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();

    if TRACKING_PARAMS.contains(&key.as_str()) {
        return true;
    }

    // Catch any utm parameter, not just the enumerated five
    key.starts_with("utm_")
}
