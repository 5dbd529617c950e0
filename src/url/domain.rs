use crate::{UrlError, UrlResult};
use url::Url;

/// Multi-label public suffixes that need three labels for a registrable
/// domain. Scope checks only ever compare hosts against a single seed
/// domain, so a handful of common suffixes is enough; everything else
/// falls back to the last two labels.
const MULTI_LABEL_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "ac.uk", "gov.uk", "me.uk", "co.jp", "ne.jp", "or.jp", "com.au", "net.au",
    "org.au", "co.nz", "co.in", "com.br", "com.mx", "co.za", "com.sg", "com.tr",
];

/// Extracts the registrable domain from a host string.
///
/// `www.` prefixes are stripped first; IP literals are returned unchanged.
///
/// # Examples
///
/// ```
/// use sitevigil::url::registrable_domain;
///
/// assert_eq!(registrable_domain("www.example.com"), "example.com");
/// assert_eq!(registrable_domain("blog.example.com"), "example.com");
/// assert_eq!(registrable_domain("shop.example.co.uk"), "example.co.uk");
/// ```
pub fn registrable_domain(host: &str) -> String {
    let host = host.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);

    // IP literals have no registrable domain
    if host.chars().all(|c| c.is_ascii_digit() || c == '.') || host.starts_with('[') {
        return host.to_string();
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return host.to_string();
    }

    let last_two = labels[labels.len() - 2..].join(".");
    let take = if MULTI_LABEL_SUFFIXES.contains(&last_two.as_str()) {
        3
    } else {
        2
    };

    if labels.len() <= take {
        host.to_string()
    } else {
        labels[labels.len() - take..].join(".")
    }
}

/// Crawl scope derived from a site's seed URL.
///
/// A host is in scope when its registrable domain matches the seed's;
/// bare-host and `www.`-prefixed variants are therefore equivalent.
#[derive(Debug, Clone)]
pub struct SeedScope {
    seed_domain: String,
}

impl SeedScope {
    /// Builds the scope from a parsed seed URL
    pub fn from_seed(seed: &Url) -> UrlResult<Self> {
        let host = seed
            .host_str()
            .ok_or_else(|| UrlError::Invalid(seed.to_string()))?;
        Ok(Self {
            seed_domain: registrable_domain(host),
        })
    }

    /// The registrable domain that defines this scope
    pub fn seed_domain(&self) -> &str {
        &self.seed_domain
    }

    /// Returns true when `host` falls inside the crawl scope
    pub fn contains(&self, host: &str) -> bool {
        registrable_domain(host) == self.seed_domain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registrable_domain_simple() {
        assert_eq!(registrable_domain("example.com"), "example.com");
        assert_eq!(registrable_domain("EXAMPLE.COM"), "example.com");
    }

    #[test]
    fn test_registrable_domain_strips_www() {
        assert_eq!(registrable_domain("www.example.com"), "example.com");
    }

    #[test]
    fn test_registrable_domain_subdomain() {
        assert_eq!(registrable_domain("api.v2.example.com"), "example.com");
    }

    #[test]
    fn test_registrable_domain_multi_label_suffix() {
        assert_eq!(registrable_domain("www.example.co.uk"), "example.co.uk");
        assert_eq!(registrable_domain("shop.example.co.uk"), "example.co.uk");
    }

    #[test]
    fn test_registrable_domain_ip() {
        assert_eq!(registrable_domain("127.0.0.1"), "127.0.0.1");
    }

    #[test]
    fn test_scope_contains_variants() {
        let seed = Url::parse("https://example.com/").unwrap();
        let scope = SeedScope::from_seed(&seed).unwrap();

        assert!(scope.contains("example.com"));
        assert!(scope.contains("www.example.com"));
        assert!(scope.contains("blog.example.com"));
        assert!(!scope.contains("example.org"));
        assert!(!scope.contains("notexample.com"));
    }
}
