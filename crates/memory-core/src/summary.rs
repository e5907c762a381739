//! Summary derivation and sensitive-content scrubbing.

use std::sync::LazyLock;

use regex::Regex;

static HEADER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#+\s+").expect("header pattern"));

static BOLD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("bold pattern"));

static FIRST_SENTENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^.!?\n]+[.!?]").expect("sentence pattern"));

static SENSITIVE_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(r"sk-ant-api\S+").expect("anthropic key pattern"),
            "[REDACTED_API_KEY]",
        ),
        (
            Regex::new(r"sk-[a-zA-Z0-9]{20,}").expect("api key pattern"),
            "[REDACTED_KEY]",
        ),
        (
            Regex::new(r"ghp_[a-zA-Z0-9]{36,}").expect("github token pattern"),
            "[REDACTED_GITHUB_TOKEN]",
        ),
        (
            Regex::new(r#"(?i)api[_-]?key\s*[:=]\s*["']?[\w-]{20,}"#).expect("keyish pattern"),
            "[REDACTED_API_KEY]",
        ),
        (
            Regex::new(r#"(?i)password\s*[:=]\s*["'][^"']{8,}["']"#).expect("password pattern"),
            "[REDACTED_PASSWORD]",
        ),
    ]
});

/// Derive a 15-25 word summary from memory content.
///
/// Skips YAML frontmatter, strips markdown headers and bold markers, then
/// prefers the first sentence when it lands between 3 and 25 words;
/// otherwise the first 20 words with an ellipsis.
pub fn generate_summary(content: &str) -> String {
    let mut text = content.trim().to_string();

    if text.starts_with("---") {
        let parts: Vec<&str> = text.splitn(3, "---").collect();
        if parts.len() >= 3 {
            text = parts[2].trim().to_string();
        }
    }

    let text = HEADER_PATTERN.replace_all(&text, "");
    let text = BOLD_PATTERN.replace_all(&text, "$1").to_string();

    if let Some(m) = FIRST_SENTENCE.find(&text) {
        let sentence = m.as_str().trim();
        let words = sentence.split_whitespace().count();
        if (3..=25).contains(&words) {
            return sentence.to_string();
        }
    }

    let words: Vec<&str> = text.split_whitespace().take(20).collect();
    if !words.is_empty() {
        return format!("{}...", words.join(" "));
    }
    text.chars().take(100).collect()
}

/// Redact API keys, tokens, and password assignments from text before it
/// is stored.
pub fn scrub_sensitive(text: &str) -> String {
    let mut out = text.to_string();
    for (pattern, replacement) in SENSITIVE_PATTERNS.iter() {
        out = pattern.replace_all(&out, *replacement).to_string();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sentence_wins_when_reasonable() {
        let summary = generate_summary("Bonsai trees need weekly watering. Much more detail follows here.");
        assert_eq!(summary, "Bonsai trees need weekly watering.");
    }

    #[test]
    fn test_long_first_sentence_falls_back_to_twenty_words() {
        let content = (0..60).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ");
        let summary = generate_summary(&content);
        assert!(summary.ends_with("..."));
        assert_eq!(summary.split_whitespace().count(), 20);
    }

    #[test]
    fn test_frontmatter_and_markdown_stripped() {
        let content = "---\ntitle: notes\n---\n# Heading\n**Bold** statement here today.";
        let summary = generate_summary(content);
        assert_eq!(summary, "Bold statement here today.");
    }

    #[test]
    fn test_scrub_redacts_keys_and_passwords() {
        let text = "key sk-abcdefghijklmnopqrstuv and password = \"hunter2secret\"";
        let scrubbed = scrub_sensitive(text);
        assert!(scrubbed.contains("[REDACTED_KEY]"));
        assert!(scrubbed.contains("[REDACTED_PASSWORD]"));
        assert!(!scrubbed.contains("hunter2secret"));
    }

    #[test]
    fn test_scrub_leaves_plain_text_alone() {
        let text = "bonsai tree plant care tips";
        assert_eq!(scrub_sensitive(text), text);
    }
}
