//! Response metrics: word and character counts.
//!
//! Computed live while the candidate types and frozen into the submission
//! at dispatch time. Validation bounds are expressed in words.

use serde::{Deserialize, Serialize};

/// Size metrics of a captured response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMetric {
    pub word_count: usize,
    pub char_count: usize,
}

impl ResponseMetric {
    /// Compute metrics for a response text.
    pub fn of(text: &str) -> Self {
        Self {
            word_count: count_words(text),
            char_count: text.chars().count(),
        }
    }
}

/// Count whitespace-separated words; blank text counts zero.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_has_zero_words() {
        assert_eq!(count_words(""), 0);
        assert_eq!(count_words("   \n\t  "), 0);
    }

    #[test]
    fn words_split_on_any_whitespace() {
        assert_eq!(count_words("one two three"), 3);
        assert_eq!(count_words("one\ntwo\t three  "), 3);
    }

    #[test]
    fn metric_counts_chars_not_bytes() {
        let metric = ResponseMetric::of("héllo wörld");
        assert_eq!(metric.word_count, 2);
        assert_eq!(metric.char_count, 11);
    }
}
