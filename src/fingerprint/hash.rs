use sha2::{Digest, Sha256};

/// SHA-256 of the normalized text's UTF-8 bytes, as 64 lowercase hex chars
pub fn content_hash(normalized_text: &str) -> String {
    format!("{:x}", Sha256::digest(normalized_text.as_bytes()))
}

/// SHA-256 over the sorted tag paths joined with `\n`.
///
/// The input is sorted here as well, so callers may pass the fingerprint
/// in document order.
pub fn structural_hash(tag_paths: &[String]) -> String {
    let mut sorted: Vec<&str> = tag_paths.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    format!("{:x}", Sha256::digest(sorted.join("\n").as_bytes()))
}
