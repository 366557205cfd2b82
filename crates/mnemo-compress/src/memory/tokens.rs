//! Token estimation
//!
//! The engine never tokenizes for real. Every size comparison (ratio, tokens
//! saved, context budgets) goes through one [`TokenEstimator`] so before and
//! after are measured the same way.

/// Pluggable token count approximation
pub trait TokenEstimator: Send + Sync {
    /// Estimated token count for `text`
    fn estimate(&self, text: &str) -> usize;
}

/// Estimate token count using a characters-per-token approximation.
///
/// Rounds up, so any non-empty text counts as at least one token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CharRatioEstimator {
    pub chars_per_token: usize,
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self { chars_per_token: 4 }
    }
}

impl TokenEstimator for CharRatioEstimator {
    #[inline]
    fn estimate(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token.max(1))
    }
}
