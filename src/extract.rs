//! Answer-text and URL extraction from message responses.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Marker the answer service emits before its source links.
const URL_MARKER: &str = "Relevant URLs:";

static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href=['"]([^'"]+)['"]"#).unwrap());

/// Answer text for a message response body: the `message` field of an object
/// (empty string when absent), or the whole body stringified otherwise.
pub fn answer_text(body: &Value) -> String {
    match body {
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        other => other.to_string(),
    }
}

/// URLs embedded after the `Relevant URLs:` marker, pulled from href
/// attributes, de-duplicated preserving first-seen order. Text before the
/// marker is ignored even if it contains anchors.
pub fn extract_urls(text: &str) -> Vec<String> {
    let Some((_, tail)) = text.split_once(URL_MARKER) else {
        return Vec::new();
    };

    let mut urls = Vec::new();
    for capture in HREF_RE.captures_iter(tail) {
        let url = capture[1].to_string();
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    urls
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn answer_text_reads_message_field() {
        let body = json!({"message": "Install the latest service pack."});
        assert_eq!(answer_text(&body), "Install the latest service pack.");
    }

    #[test]
    fn answer_text_is_empty_for_object_without_message() {
        assert_eq!(answer_text(&json!({"status": "ok"})), "");
    }

    #[test]
    fn answer_text_stringifies_non_objects() {
        assert_eq!(answer_text(&json!(["a", "b"])), r#"["a","b"]"#);
    }

    #[test]
    fn no_marker_means_no_urls() {
        let text = r#"See <a href="http://early.example">this</a> instead."#;
        assert!(extract_urls(text).is_empty());
    }

    #[test]
    fn urls_after_marker_both_quote_styles() {
        let text = concat!(
            "Answer body.<br>Relevant URLs:<br>",
            r#"<a href='http://x'>x</a> <a href="https://y/doc">y</a>"#,
        );
        assert_eq!(extract_urls(text), ["http://x", "https://y/doc"]);
    }

    #[test]
    fn duplicate_hrefs_are_collapsed_in_first_seen_order() {
        let text = concat!(
            "Relevant URLs:",
            r#"<a href='http://x'>x</a><a href='http://z'>z</a><a href='http://x'>x again</a>"#,
        );
        assert_eq!(extract_urls(text), ["http://x", "http://z"]);
    }

    #[test]
    fn anchors_before_marker_are_ignored() {
        let text = concat!(
            r#"<a href="http://before">nope</a> Relevant URLs: "#,
            r#"<a href="http://after">yes</a>"#,
        );
        assert_eq!(extract_urls(text), ["http://after"]);
    }
}
