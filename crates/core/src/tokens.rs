//! Token estimation
//!
//! Grapheme-based heuristic: roughly four graphemes per token for English
//! text. Used wherever a token budget is enforced without a tokenizer.

use unicode_segmentation::UnicodeSegmentation;

/// Estimate the token count of `text`
pub fn estimate_tokens(text: &str) -> usize {
    let graphemes = text.graphemes(true).count();
    graphemes.div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
        assert_eq!(estimate_tokens("abcdefghi"), 3);
    }
}
