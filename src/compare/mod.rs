//! Comparator / verdict engine
//!
//! A pure analytical comparison between a live observation and a stored
//! baseline: drift scalars, indicator labels, and a deterministic
//! status/severity/confidence classification. The engine never mutates
//! baselines and never looks at other URLs.

use crate::fingerprint::content_hash;
use crate::storage::PageVersion;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

/// Outcome status of one comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictStatus {
    Clean,
    PotentialDefacement,
    Defaced,
    Failed,
}

impl VerdictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clean => "CLEAN",
            Self::PotentialDefacement => "POTENTIAL_DEFACEMENT",
            Self::Defaced => "DEFACED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity attached to a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tunable thresholds for the comparator
#[derive(Debug, Clone)]
pub struct ComparePolicy {
    /// Drift below this value in both dimensions is treated as noise
    pub noise_floor: f64,
}

impl Default for ComparePolicy {
    fn default() -> Self {
        Self { noise_floor: 0.05 }
    }
}

/// Thresholds at which drift becomes an indicator
const STRUCTURAL_COLLAPSE_THRESHOLD: f64 = 0.6;
const TEXT_REPLACEMENT_THRESHOLD: f64 = 0.7;

/// Immutable output of a single comparator run
#[derive(Debug, Clone)]
pub struct Verdict {
    pub url: String,
    pub baseline_hash: String,
    pub observed_hash: String,
    pub status: VerdictStatus,
    pub severity: Severity,
    pub confidence: f64,
    pub structural_drift: f64,
    pub content_drift: f64,
    pub indicators: Vec<String>,
    pub detected_at: DateTime<Utc>,
}

/// Live observation handed to the comparator by the worker
#[derive(Debug, Clone)]
pub struct LiveObservation {
    pub url: String,
    pub normalized_text: String,
    pub tag_paths: Vec<String>,
    pub script_srcs: Vec<String>,
}

/// Comparator bound to the current normalization version
#[derive(Debug, Clone)]
pub struct Comparator {
    policy: ComparePolicy,
    norm_version: String,
}

impl Comparator {
    pub fn new(policy: ComparePolicy, norm_version: &str) -> Self {
        Self {
            policy,
            norm_version: norm_version.to_string(),
        }
    }

    /// Compares a live observation against its stored baseline.
    ///
    /// Decision order:
    /// 1. hash match -> CLEAN
    /// 2. script added -> DEFACED (CRITICAL when structure or text also
    ///    collapsed)
    /// 3. structural collapse -> DEFACED
    /// 4. text replacement without script changes -> POTENTIAL, MEDIUM
    /// 5. both drifts under the noise floor -> CLEAN
    /// 6. otherwise -> POTENTIAL, LOW
    pub fn compare(&self, live: &LiveObservation, baseline: &PageVersion) -> Verdict {
        let observed_hash = content_hash(&live.normalized_text);
        let baseline_hash = baseline.content_hash.clone();

        if baseline.norm_version != self.norm_version {
            return Verdict {
                url: live.url.clone(),
                baseline_hash,
                observed_hash,
                status: VerdictStatus::Failed,
                severity: Severity::None,
                confidence: 0.0,
                structural_drift: 0.0,
                content_drift: 0.0,
                indicators: vec!["VERSION_MISMATCH".to_string()],
                detected_at: Utc::now(),
            };
        }

        if observed_hash == baseline_hash {
            return Verdict {
                url: live.url.clone(),
                baseline_hash,
                observed_hash,
                status: VerdictStatus::Clean,
                severity: Severity::None,
                confidence: 1.0,
                structural_drift: 0.0,
                content_drift: 0.0,
                indicators: vec!["HASH_MATCH".to_string()],
                detected_at: Utc::now(),
            };
        }

        let structural_drift = jaccard_distance(&live.tag_paths, &baseline.tag_paths);
        let content_drift = token_cosine_drift(&live.normalized_text, &baseline.normalized_text);

        let live_scripts: HashSet<&str> = live.script_srcs.iter().map(String::as_str).collect();
        let base_scripts: HashSet<&str> = baseline.script_srcs.iter().map(String::as_str).collect();
        let script_added = live_scripts.difference(&base_scripts).next().is_some();
        let script_removed = base_scripts.difference(&live_scripts).next().is_some();

        let structural_collapse = structural_drift >= STRUCTURAL_COLLAPSE_THRESHOLD;
        let text_replacement = content_drift >= TEXT_REPLACEMENT_THRESHOLD;

        let mut indicators: Vec<String> = Vec::new();
        if script_added {
            indicators.push("SCRIPT_ADDED".to_string());
        }
        if script_removed {
            indicators.push("SCRIPT_REMOVED".to_string());
        }
        if structural_collapse {
            indicators.push("STRUCTURAL_COLLAPSE".to_string());
        }
        if text_replacement {
            indicators.push("TEXT_REPLACEMENT".to_string());
        }

        let (status, severity, confidence) = if script_added {
            let severity = if structural_collapse || text_replacement {
                Severity::Critical
            } else {
                Severity::High
            };
            (VerdictStatus::Defaced, severity, 0.9)
        } else if structural_collapse {
            (VerdictStatus::Defaced, Severity::High, 0.85)
        } else if text_replacement && !script_removed {
            (VerdictStatus::PotentialDefacement, Severity::Medium, 0.7)
        } else if structural_drift < self.policy.noise_floor && content_drift < self.policy.noise_floor
        {
            let confidence = 1.0 - structural_drift.max(content_drift);
            (VerdictStatus::Clean, Severity::None, confidence)
        } else {
            (VerdictStatus::PotentialDefacement, Severity::Low, 0.5)
        };

        Verdict {
            url: live.url.clone(),
            baseline_hash,
            observed_hash,
            status,
            severity,
            confidence,
            structural_drift,
            content_drift,
            indicators,
            detected_at: Utc::now(),
        }
    }

    /// Verdict for a URL that has no stored baseline (COMPARE mode only)
    pub fn no_baseline(&self, url: &str, live_text: &str) -> Verdict {
        Verdict {
            url: url.to_string(),
            baseline_hash: String::new(),
            observed_hash: content_hash(live_text),
            status: VerdictStatus::Failed,
            severity: Severity::None,
            confidence: 0.0,
            structural_drift: 0.0,
            content_drift: 0.0,
            indicators: vec!["NO_BASELINE".to_string()],
            detected_at: Utc::now(),
        }
    }
}

/// Jaccard distance between the two structural fingerprints, treated as
/// sets of tag paths. Two empty fingerprints have zero distance.
fn jaccard_distance(a: &[String], b: &[String]) -> f64 {
    let set_a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let set_b: HashSet<&str> = b.iter().map(String::as_str).collect();

    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();

    1.0 - intersection as f64 / union as f64
}

/// `1 - cosine similarity` over whitespace-tokenized word multisets
fn token_cosine_drift(a: &str, b: &str) -> f64 {
    let counts_a = token_counts(a);
    let counts_b = token_counts(b);

    if counts_a.is_empty() && counts_b.is_empty() {
        return 0.0;
    }
    if counts_a.is_empty() || counts_b.is_empty() {
        return 1.0;
    }

    let mut dot = 0.0;
    for (token, count_a) in &counts_a {
        if let Some(count_b) = counts_b.get(token) {
            dot += (*count_a as f64) * (*count_b as f64);
        }
    }

    let norm_a: f64 = counts_a.values().map(|c| (*c as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = counts_b.values().map(|c| (*c as f64).powi(2)).sum::<f64>().sqrt();

    (1.0 - dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

fn token_counts(text: &str) -> HashMap<&str, u32> {
    let mut counts = HashMap::new();
    for token in text.split_whitespace() {
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{structural_hash, NORM_VERSION};

    fn baseline(text: &str, paths: Vec<&str>, scripts: Vec<&str>) -> PageVersion {
        let paths: Vec<String> = paths.into_iter().map(String::from).collect();
        PageVersion {
            url: "https://x.test/p".to_string(),
            normalized_text: text.to_string(),
            content_hash: content_hash(text),
            structural_hash: structural_hash(&paths),
            tag_paths: paths,
            script_srcs: scripts.into_iter().map(String::from).collect(),
            norm_version: NORM_VERSION.to_string(),
            created_at: Utc::now().to_rfc3339(),
        }
    }

    fn live(text: &str, paths: Vec<&str>, scripts: Vec<&str>) -> LiveObservation {
        LiveObservation {
            url: "https://x.test/p".to_string(),
            normalized_text: text.to_string(),
            tag_paths: paths.into_iter().map(String::from).collect(),
            script_srcs: scripts.into_iter().map(String::from).collect(),
        }
    }

    fn comparator() -> Comparator {
        Comparator::new(ComparePolicy::default(), NORM_VERSION)
    }

    #[test]
    fn test_hash_match_is_clean() {
        let verdict = comparator().compare(
            &live("same text here", vec!["/html/body/p"], vec!["a.js"]),
            &baseline("same text here", vec!["/html/body/p"], vec!["a.js"]),
        );
        assert_eq!(verdict.status, VerdictStatus::Clean);
        assert_eq!(verdict.severity, Severity::None);
        assert_eq!(verdict.confidence, 1.0);
        assert_eq!(verdict.indicators, vec!["HASH_MATCH".to_string()]);
    }

    #[test]
    fn test_hash_match_short_circuits_script_signals() {
        // Same normalized text but different script sets: hash wins
        let verdict = comparator().compare(
            &live("text", vec!["/p"], vec!["a.js", "evil.js"]),
            &baseline("text", vec!["/p"], vec!["a.js"]),
        );
        assert_eq!(verdict.status, VerdictStatus::Clean);
        assert_eq!(verdict.indicators, vec!["HASH_MATCH".to_string()]);
    }

    #[test]
    fn test_script_injection_is_defaced_high() {
        let verdict = comparator().compare(
            &live(
                "mostly the same words on this page today",
                vec!["/html/body/p"],
                vec!["a.js", "evil.js"],
            ),
            &baseline(
                "mostly the same words on this page yesterday",
                vec!["/html/body/p"],
                vec!["a.js"],
            ),
        );
        assert_eq!(verdict.status, VerdictStatus::Defaced);
        assert_eq!(verdict.severity, Severity::High);
        assert_eq!(verdict.confidence, 0.9);
        assert!(verdict.indicators.contains(&"SCRIPT_ADDED".to_string()));
    }

    #[test]
    fn test_script_injection_with_text_replacement_is_critical() {
        let verdict = comparator().compare(
            &live(
                "HACKED BY SOMEONE totally different words",
                vec!["/html/body/p"],
                vec!["evil.js"],
            ),
            &baseline(
                "welcome to our corporate homepage services",
                vec!["/html/body/p"],
                vec![],
            ),
        );
        assert_eq!(verdict.status, VerdictStatus::Defaced);
        assert_eq!(verdict.severity, Severity::Critical);
        assert!(verdict.indicators.contains(&"SCRIPT_ADDED".to_string()));
        assert!(verdict.indicators.contains(&"TEXT_REPLACEMENT".to_string()));
    }

    #[test]
    fn test_structural_collapse_is_defaced() {
        let verdict = comparator().compare(
            &live("flat replacement page", vec!["/html/body/div"], vec![]),
            &baseline(
                "original layout text",
                vec![
                    "/html/body/header",
                    "/html/body/main",
                    "/html/body/main/article",
                    "/html/body/footer",
                    "/html/body/nav",
                ],
                vec![],
            ),
        );
        assert!(verdict.structural_drift >= 0.6);
        assert_eq!(verdict.status, VerdictStatus::Defaced);
        assert_eq!(verdict.severity, Severity::High);
        assert_eq!(verdict.confidence, 0.85);
        assert!(verdict.indicators.contains(&"STRUCTURAL_COLLAPSE".to_string()));
    }

    #[test]
    fn test_text_replacement_without_scripts_is_potential_medium() {
        let verdict = comparator().compare(
            &live(
                "attacker slogan one two three four five six",
                vec!["/html/body/p"],
                vec!["a.js"],
            ),
            &baseline(
                "company welcome page about products contact imprint",
                vec!["/html/body/p"],
                vec!["a.js"],
            ),
        );
        assert_eq!(verdict.status, VerdictStatus::PotentialDefacement);
        assert_eq!(verdict.severity, Severity::Medium);
        assert_eq!(verdict.confidence, 0.7);
        assert!(verdict.indicators.contains(&"TEXT_REPLACEMENT".to_string()));
        assert!(verdict.content_drift >= 0.7);
        assert!(verdict.structural_drift < 0.05);
    }

    #[test]
    fn test_small_drift_under_noise_floor_is_clean() {
        let verdict = comparator().compare(
            &live(
                "the quick brown fox jumps over the lazy dog again and again and again today",
                vec!["/html/body/p", "/html/body/div"],
                vec![],
            ),
            &baseline(
                "the quick brown fox jumps over the lazy dog again and again and again tonight",
                vec!["/html/body/p", "/html/body/div"],
                vec![],
            ),
        );
        assert_eq!(verdict.status, VerdictStatus::Clean);
        assert_eq!(verdict.severity, Severity::None);
        assert!(verdict.content_drift < 0.05);
    }

    #[test]
    fn test_moderate_drift_is_potential_low() {
        let verdict = comparator().compare(
            &live(
                "half the words are shared half the words differ alpha beta gamma",
                vec!["/html/body/p", "/html/body/div", "/html/body/span"],
                vec![],
            ),
            &baseline(
                "half the words are shared half the words differ delta epsilon zeta",
                vec!["/html/body/p", "/html/body/div", "/html/body/section"],
                vec![],
            ),
        );
        assert_eq!(verdict.status, VerdictStatus::PotentialDefacement);
        assert_eq!(verdict.severity, Severity::Low);
        assert_eq!(verdict.confidence, 0.5);
    }

    #[test]
    fn test_version_mismatch_fails() {
        let mut base = baseline("text", vec!["/p"], vec![]);
        base.norm_version = "v0.9".to_string();
        let verdict = comparator().compare(&live("text", vec!["/p"], vec![]), &base);
        assert_eq!(verdict.status, VerdictStatus::Failed);
        assert_eq!(verdict.severity, Severity::None);
        assert!(verdict.indicators.contains(&"VERSION_MISMATCH".to_string()));
    }

    #[test]
    fn test_no_baseline_fails() {
        let verdict = comparator().no_baseline("https://x.test/new", "some text");
        assert_eq!(verdict.status, VerdictStatus::Failed);
        assert_eq!(verdict.severity, Severity::None);
        assert!(verdict.indicators.contains(&"NO_BASELINE".to_string()));
    }

    #[test]
    fn test_deterministic_apart_from_timestamp() {
        let live_obs = live("words on the page", vec!["/p", "/div"], vec!["a.js"]);
        let base = baseline("other words entirely", vec!["/p"], vec![]);
        let comparator = comparator();

        let a = comparator.compare(&live_obs, &base);
        let b = comparator.compare(&live_obs, &base);

        assert_eq!(a.status, b.status);
        assert_eq!(a.severity, b.severity);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.structural_drift, b.structural_drift);
        assert_eq!(a.content_drift, b.content_drift);
        assert_eq!(a.indicators, b.indicators);
    }

    #[test]
    fn test_jaccard_distance() {
        let a = vec!["/a".to_string(), "/b".to_string()];
        let b = vec!["/b".to_string(), "/c".to_string()];
        let d = jaccard_distance(&a, &b);
        assert!((d - (1.0 - 1.0 / 3.0)).abs() < 1e-9);

        assert_eq!(jaccard_distance(&[], &[]), 0.0);
        assert_eq!(jaccard_distance(&a, &a), 0.0);
    }

    #[test]
    fn test_token_cosine_drift_bounds() {
        assert_eq!(token_cosine_drift("", ""), 0.0);
        assert_eq!(token_cosine_drift("a b c", ""), 1.0);
        assert_eq!(token_cosine_drift("a b c", "a b c"), 0.0);
        assert!((token_cosine_drift("a a", "a a a") - 0.0).abs() < 1e-9);

        let disjoint = token_cosine_drift("a b c", "x y z");
        assert!((disjoint - 1.0).abs() < 1e-9);
    }
}
