//! Token estimation utilities
//!
//! Provides simple token counting heuristics for text content.

/// Bytes assumed per token.
pub const BYTES_PER_TOKEN: usize = 4;

/// Estimate token count from string
///
/// Simple estimation: 1 token ≈ 4 bytes, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(BYTES_PER_TOKEN)
}

/// Truncate string to approximate token limit
///
/// Cuts at the last char boundary inside the budget so multi-byte text never
/// splits a code point. Returns the input unchanged when it already fits.
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> &str {
    let max_bytes = max_tokens.saturating_mul(BYTES_PER_TOKEN);
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text.get(..end).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("test"), 1);
        assert_eq!(estimate_tokens("hello world"), 3);
        assert_eq!(estimate_tokens("a".repeat(100).as_str()), 25);
    }

    #[test]
    fn test_truncate_to_tokens() {
        let text = "a".repeat(100);
        let truncated = truncate_to_tokens(&text, 10);
        assert_eq!(truncated.len(), 40);
        assert_eq!(truncate_to_tokens("short", 10), "short");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // 'é' is two bytes, so byte 4 falls inside the third character
        let text = "ééééé";
        let truncated = truncate_to_tokens(text, 1);
        assert_eq!(truncated, "éé");
        assert!(estimate_tokens(truncated) <= 1);
    }
}
