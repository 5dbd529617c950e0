//! Semantic HTML normalization
//!
//! Converts raw HTML into a deterministic line-based serialization that
//! survives the noise real pages carry between visits: cache-buster
//! comments, inline scripts, whitespace reflows, framework-generated ids.
//! The same walk also produces the structural tag-path fingerprint.

use ego_tree::NodeRef;
use regex::Regex;
use scraper::node::Node;
use scraper::Html;
use std::sync::OnceLock;
use unicode_normalization::UnicodeNormalization;

/// Elements whose entire subtree is dropped during normalization
const DROPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "iframe"];

/// Result of normalizing one HTML document
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPage {
    /// Canonical UTF-8 serialization: one line per tag or text run
    pub text: String,

    /// Sorted multiset of tag paths (`/html/body/div/p`) of the
    /// post-cleanup DOM
    pub tag_paths: Vec<String>,
}

fn dynamic_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(react-[0-9a-f-]+|ember\d+|ng-[a-z0-9]+-\d+|data-v-[0-9a-f]+)").unwrap()
    })
}

fn display_none_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"display\s*:\s*none").unwrap())
}

/// Normalizes an HTML document into canonical text plus a structural
/// fingerprint.
///
/// The parser is lenient; malformed input yields whatever DOM the parser
/// recovers, never an error. The output is deterministic: byte-equal input
/// produces byte-equal output.
pub fn semantic_normalize(html: &str) -> NormalizedPage {
    let document = Html::parse_document(html);

    let mut lines: Vec<String> = Vec::new();
    let mut tag_paths: Vec<String> = Vec::new();
    let mut path_stack: Vec<String> = Vec::new();

    for child in document.tree.root().children() {
        walk(child, 0, &mut path_stack, &mut lines, &mut tag_paths);
    }

    tag_paths.sort_unstable();

    NormalizedPage {
        text: lines.join("\n"),
        tag_paths,
    }
}

fn walk(
    node: NodeRef<'_, Node>,
    depth: usize,
    path_stack: &mut Vec<String>,
    lines: &mut Vec<String>,
    tag_paths: &mut Vec<String>,
) {
    match node.value() {
        Node::Element(element) => {
            let name = element.name().to_lowercase();

            if DROPPED_ELEMENTS.contains(&name.as_str()) {
                return;
            }

            if let Some(style) = element.attr("style") {
                if display_none_re().is_match(&style.to_lowercase()) {
                    return;
                }
            }

            path_stack.push(name.clone());
            tag_paths.push(format!("/{}", path_stack.join("/")));

            let indent = "  ".repeat(depth);
            lines.push(format!("{}<{}{}>", indent, name, render_attrs(element)));

            for child in node.children() {
                walk(child, depth + 1, path_stack, lines, tag_paths);
            }

            lines.push(format!("{}</{}>", indent, name));
            path_stack.pop();
        }
        Node::Text(text) => {
            let normalized = normalize_text(text);
            if !normalized.is_empty() {
                lines.push(format!("{}{}", "  ".repeat(depth), normalized));
            }
        }
        // Comments, doctype and processing instructions carry no content
        Node::Comment(_) | Node::Doctype(_) | Node::ProcessingInstruction(_) => {}
        Node::Document | Node::Fragment => {
            for child in node.children() {
                walk(child, depth, path_stack, lines, tag_paths);
            }
        }
    }
}

/// Renders the kept attributes of an element, sorted by name, with class
/// tokens sorted alphabetically and dynamic framework attributes dropped.
fn render_attrs(element: &scraper::node::Element) -> String {
    let mut attrs: Vec<(String, String)> = element
        .attrs()
        .filter(|(name, value)| !is_dynamic_attr(name, value))
        .map(|(name, value)| {
            let name = name.to_lowercase();
            let value = if name == "class" {
                sort_class_tokens(value)
            } else {
                value.to_string()
            };
            (name, value)
        })
        .collect();

    attrs.sort_by(|a, b| a.0.cmp(&b.0));

    attrs
        .iter()
        .map(|(name, value)| format!(" {}=\"{}\"", name, value))
        .collect()
}

/// Attributes that vary between renders of the same page: framework
/// instance ids, scoped-style markers, CSRF nonces.
fn is_dynamic_attr(name: &str, value: &str) -> bool {
    let name_lower = name.to_lowercase();

    if name_lower.contains("nonce") || name_lower.contains("csrf") {
        return true;
    }

    let value_lower = value.to_lowercase();
    if value_lower.contains("nonce=") || value_lower.contains("csrf=") {
        return true;
    }

    dynamic_value_re().is_match(&name_lower) || dynamic_value_re().is_match(&value_lower)
}

fn sort_class_tokens(value: &str) -> String {
    let mut tokens: Vec<&str> = value.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// NFC-normalizes a text node and collapses whitespace runs to one space
fn normalize_text(raw: &str) -> String {
    let composed: String = raw.nfc().collect();
    composed.split_whitespace().collect::<Vec<_>>().join(" ")
}
