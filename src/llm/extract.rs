//! Extraction of the news payload from model output.
//!
//! Models are instructed to answer with bare JSON, but in practice replies
//! arrive wrapped in markdown fences or surrounded by commentary. Parsing
//! is attempted in order of strictness:
//!
//! 1. the whole reply as JSON;
//! 2. the first fenced ```json block;
//! 3. a balanced-brace scan for the first object containing a `"news"` key.
//!
//! If nothing yields a payload the reply is malformed and the error
//! propagates like any other provider failure.

use regex::Regex;
use std::sync::OnceLock;

use super::{NewsPayload, ProviderError};

static FENCE_RE: OnceLock<Regex> = OnceLock::new();

fn fence_re() -> &'static Regex {
    FENCE_RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("static regex")
    })
}

/// Parse a provider reply into a [`NewsPayload`].
pub fn extract_news_payload(content: &str) -> Result<NewsPayload, ProviderError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ProviderError::Parse("empty response body".to_string()));
    }

    if let Some(payload) = try_parse(content) {
        return Ok(payload);
    }

    if let Some(captures) = fence_re().captures(content) {
        if let Some(payload) = try_parse(&captures[1]) {
            return Ok(payload);
        }
    }

    if let Some(payload) = scan_balanced_objects(content) {
        return Ok(payload);
    }

    Err(ProviderError::Parse(format!(
        "no news payload in response: {}",
        snippet(content)
    )))
}

fn try_parse(text: &str) -> Option<NewsPayload> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    if !value.get("news").is_some_and(|n| n.is_array()) {
        return None;
    }
    NewsPayload::from_value(value).ok()
}

/// Walk the text tracking brace depth and try every top-level object that
/// mentions `"news"`. Braces inside JSON strings are handled by skipping
/// quoted sections.
fn scan_balanced_objects(content: &str) -> Option<NewsPayload> {
    let bytes = content.as_bytes();
    let mut depth = 0usize;
    let mut start: Option<usize> = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(s) = start.take() {
                            let candidate = &content[s..=i];
                            if candidate.contains("\"news\"") {
                                if let Some(payload) = try_parse(candidate) {
                                    return Some(payload);
                                }
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }
    None
}

fn snippet(content: &str) -> &str {
    let mut end = content.len().min(200);
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    &content[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_json() {
        let payload = extract_news_payload(
            r#"{"news": [{"title": "A", "summary": "B", "source_url": "https://x.example"}]}"#,
        )
        .unwrap();
        assert_eq!(payload.news.len(), 1);
    }

    #[test]
    fn parses_fenced_json() {
        let reply = "Here you go:\n```json\n{\"news\": [{\"title\": \"A\"}]}\n```\nDone.";
        let payload = extract_news_payload(reply).unwrap();
        assert_eq!(payload.news.len(), 1);
    }

    #[test]
    fn parses_embedded_object() {
        let reply = "I searched the site. {\"news\": [{\"title\": \"A\", \"summary\": \"S\"}]} Hope this helps.";
        let payload = extract_news_payload(reply).unwrap();
        assert_eq!(payload.news.len(), 1);
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_the_scan() {
        let reply = r#"note {"news": [{"title": "uses } brace", "summary": "{"}]} end"#;
        let payload = extract_news_payload(reply).unwrap();
        assert_eq!(payload.news[0].title.resolve("en"), Some("uses } brace"));
    }

    #[test]
    fn empty_news_list_is_a_valid_payload() {
        let payload = extract_news_payload(r#"{"news": []}"#).unwrap();
        assert!(payload.news.is_empty());
    }

    #[test]
    fn prose_without_payload_is_a_parse_error() {
        let err = extract_news_payload("Sorry, I could not find anything.").unwrap_err();
        assert_eq!(err.kind(), super::super::ProviderErrorKind::Parse);
    }

    #[test]
    fn json_without_news_key_is_rejected() {
        let err = extract_news_payload(r#"{"articles": []}"#).unwrap_err();
        assert_eq!(err.kind(), super::super::ProviderErrorKind::Parse);
    }
}
