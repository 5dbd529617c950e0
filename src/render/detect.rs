//! Heuristic for escalating a fetched page to headless rendering.
//!
//! React, Vue, Angular and Next.js shells ship a near-empty body and
//! hydrate client-side; fetching them without a browser yields a husk.

/// Known SPA root markers in server-delivered HTML
const SPA_MARKERS: &[&str] = &[
    "id=\"root\"",
    "id=\"app\"",
    "id=\"__next\"",
    "<app-root",
    "ng-app",
    "data-reactroot",
];

/// Elements whose presence inside `<body>` indicates real server-rendered
/// content
const CONTENT_MARKERS: &[&str] = &["<a ", "<p", "<main", "<article", "<section"];

/// Visible text under this length, next to at least ten times as much
/// script, marks a hydration shell
const SPARSE_TEXT_LIMIT: usize = 150;

/// Returns true when the fetched HTML needs JavaScript rendering to
/// produce its real content.
pub fn needs_js_rendering(html: &str) -> bool {
    if html.trim().is_empty() {
        return true;
    }

    let lowered = html.to_lowercase();

    if SPA_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return true;
    }

    // A body without any content elements is a hydration shell
    if let Some(body_start) = lowered.find("<body") {
        let body = &lowered[body_start..];
        if !CONTENT_MARKERS.iter().any(|marker| body.contains(marker)) {
            return true;
        }
    }

    // Almost no visible text next to a large script payload
    let (visible, script) = text_and_script_weight(&lowered);
    visible < SPARSE_TEXT_LIMIT && script > visible.saturating_mul(10) && script > 0

}

/// Counts non-whitespace bytes of visible text versus bytes inside
/// `<script>` elements
fn text_and_script_weight(lowered: &str) -> (usize, usize) {
    let mut visible = 0usize;
    let mut script = 0usize;
    let mut in_tag = false;
    let mut in_script = false;

    let bytes = lowered.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if !in_tag && bytes[i] == b'<' {
            if lowered[i..].starts_with("<script") {
                in_script = true;
            } else if lowered[i..].starts_with("</script") {
                in_script = false;
            }
            in_tag = true;
            i += 1;
            continue;
        }

        if in_tag {
            if bytes[i] == b'>' {
                in_tag = false;
            }
        } else if in_script {
            if !bytes[i].is_ascii_whitespace() {
                script += 1;
            }
        } else if !bytes[i].is_ascii_whitespace() {
            visible += 1;
        }

        i += 1;
    }

    (visible, script)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_react_root_detected() {
        assert!(needs_js_rendering(
            "<html><body><div id=\"root\"></div></body></html>"
        ));
    }

    #[test]
    fn test_next_and_angular_detected() {
        assert!(needs_js_rendering("<body><div id=\"__next\"></div></body>"));
        assert!(needs_js_rendering("<body><app-root></app-root></body>"));
        assert!(needs_js_rendering("<html ng-app=\"shop\"><body></body></html>"));
        assert!(needs_js_rendering(
            "<body><div data-reactroot=\"\"></div></body>"
        ));
    }

    #[test]
    fn test_empty_shell_detected() {
        assert!(needs_js_rendering(
            "<html><body><div class=\"loader\"></div></body></html>"
        ));
        assert!(needs_js_rendering(""));
    }

    #[test]
    fn test_script_heavy_shell_detected() {
        let bundle = "var module=".to_string() + &"x".repeat(5000) + ";";
        let html = format!(
            "<html><body><p>loading</p><a href=\"/\">.</a><script>{bundle}</script></body></html>"
        );
        assert!(needs_js_rendering(&html));
    }

    #[test]
    fn test_server_rendered_content_passes() {
        assert!(!needs_js_rendering(
            "<html><body><main><p>Real content</p><a href=\"/x\">link</a></main></body></html>"
        ));
    }

    #[test]
    fn test_text_and_script_weight() {
        let (visible, script) =
            text_and_script_weight("<body><p>hello world</p><script>var x = 1;</script></body>");
        assert_eq!(visible, "helloworld".len());
        assert_eq!(script, "varx=1;".len());
    }
}
