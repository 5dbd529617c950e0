//! Content fingerprinting module
//!
//! Normalization decides what counts as "the same page": the semantic
//! normalizer strips scripts, styles, hidden subtrees and volatile
//! framework attributes, and emits a deterministic text serialization plus
//! a structural tag-path fingerprint. Hashing is plain SHA-256 over those
//! outputs.
//!
//! The rule set is versioned by [`NORM_VERSION`]; baselines produced under
//! a different tag are never comparable.

mod extract;
mod hash;
mod normalize;

pub use extract::{extract_script_srcs, extract_urls};
pub use hash::{content_hash, structural_hash};
pub use normalize::{semantic_normalize, NormalizedPage};

/// Tag identifying the normalization rule set in effect.
///
/// Stored with every baseline; bumped whenever a rule change would alter
/// the output for unchanged input.
pub const NORM_VERSION: &str = "v1.2";
