use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

static JSON_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\{.*\}").expect("valid JSON block pattern")
});

/// The outermost `{...}` span of a model reply: from the first opening brace
/// to the last closing one.
pub fn extract_json_block(text: &str) -> Option<&str> {
    JSON_BLOCK.find(text).map(|m| m.as_str())
}

/// Shared HTTP client for the upstream APIs.
///
/// # Errors
/// If the TLS backend cannot be initialized.
pub fn build_http_client(timeout_secs: u64) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(index, _)| &text[..index])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_block_spans_first_to_last_brace() {
        let reply = "Voici le contenu :\n```json\n{\"a\": {\"b\": 1}}\n```\nBonne lecture";
        assert_eq!(extract_json_block(reply), Some("{\"a\": {\"b\": 1}}"));
        assert_eq!(extract_json_block("pas de json"), None);
        assert_eq!(extract_json_block("{ ouvert seulement"), None);
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("éàü", 2), "éà");
        assert_eq!(truncate_chars("court", 100), "court");
    }
}
