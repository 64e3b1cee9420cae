use once_cell::sync::Lazy;
use regex::Regex;

/// Longest question forwarded to the language model, in characters.
pub const MAX_QUESTION_CHARS: usize = 10_000;

static REASONING_BLOCK_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(think|reasoning|internal)>.*?</(?:think|reasoning|internal)>|<think\s*/>")
        .unwrap()
});

static MULTIPLE_NEWLINES_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

static SCRIPT_OPEN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<(/?script)").unwrap());

static SCRIPT_BLOCK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script\s*>").unwrap());

static SCRIPT_URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:java|vb)script:").unwrap());

static EVENT_HANDLER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\bon\w+\s*=\s*["'][^"']*["']"#).unwrap());

/// Clean a chat reply before it is stored or returned.
///
/// Drops reasoning blocks some models emit, collapses runs of blank lines and
/// escapes `<script` so clients rendering the reply as HTML stay inert.
pub fn clean_llm_response(response: &str) -> String {
    let cleaned = REASONING_BLOCK_PATTERN.replace_all(response, "");
    let cleaned = SCRIPT_OPEN_PATTERN.replace_all(&cleaned, "&lt;${1}");
    let cleaned = cleaned.trim();
    MULTIPLE_NEWLINES_PATTERN
        .replace_all(cleaned, "\n\n")
        .into_owned()
}

/// Strip markup that could turn a question into an injection vector.
///
/// Patterns are removed until the text stops changing, so nested payloads
/// such as `javajavascript:script:` do not reassemble.
pub fn sanitize_question(input: &str) -> String {
    let mut current = input.to_string();
    loop {
        let next = [&*SCRIPT_BLOCK_PATTERN, &*SCRIPT_URL_PATTERN, &*EVENT_HANDLER_PATTERN]
            .iter()
            .fold(current.clone(), |text, pattern| {
                pattern.replace_all(&text, "").into_owned()
            });
        if next == current {
            break;
        }
        current = next;
    }

    if current.chars().count() > MAX_QUESTION_CHARS {
        current = current.chars().take(MAX_QUESTION_CHARS).collect();
    }
    current.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_reasoning_blocks() {
        assert_eq!(
            clean_llm_response("<think>Some reasoning here</think>The actual response"),
            "The actual response"
        );
        assert_eq!(clean_llm_response("<think />Answer"), "Answer");
        assert_eq!(
            clean_llm_response("<reasoning>a\nb</reasoning>Final <internal>x</internal>answer"),
            "Final answer"
        );
    }

    #[test]
    fn test_clean_collapses_blank_lines() {
        assert_eq!(clean_llm_response("Line 1\n\n\n\n\nLine 2"), "Line 1\n\nLine 2");
    }

    #[test]
    fn test_clean_neutralizes_script() {
        let out = clean_llm_response("Use <SCRIPT>alert(1)</script> carefully");
        assert!(!out.to_lowercase().contains("<script"));
        assert!(out.contains("&lt;SCRIPT"));
        assert!(out.contains("&lt;/script"));
    }

    #[test]
    fn test_sanitize_removes_markup() {
        assert_eq!(
            sanitize_question("What is the mean? <script>steal()</script>"),
            "What is the mean?"
        );
        assert_eq!(sanitize_question("open javascript:alert(1)"), "open alert(1)");
        assert_eq!(
            sanitize_question(r#"<a onclick="evil()">Total</a> sales"#),
            "<a >Total</a> sales"
        );
    }

    #[test]
    fn test_sanitize_nested_payloads() {
        assert_eq!(sanitize_question("javajavascript:script:x"), "x");
    }

    #[test]
    fn test_sanitize_keeps_ordinary_words() {
        let q = "Which condition='ok' rows are online?";
        assert_eq!(sanitize_question(q), q);
    }

    #[test]
    fn test_sanitize_caps_length_and_trims() {
        let long = format!("  {}", "é".repeat(MAX_QUESTION_CHARS + 50));
        let out = sanitize_question(&long);
        assert_eq!(out.chars().count(), MAX_QUESTION_CHARS - 2);
        assert_eq!(sanitize_question("   "), "");
    }
}
