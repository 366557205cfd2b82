//! Outcome of a compression run

use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use crate::memory::types::{ScoredMemory, Summary, SummaryStrategy, Tier};

/// Why a batch produced no summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchErrorKind {
    /// The summary could not be handed to the store
    Persistence,
    /// The fallback summarizer failed or returned nothing
    InvariantViolation,
}

/// A batch-level failure reported inside an otherwise successful run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchError {
    pub tier: Tier,
    pub source_ids: Vec<Uuid>,
    pub kind: BatchErrorKind,
    pub message: String,
}

/// Result of a compression run
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompressionRunResult {
    /// Number of distinct memories examined
    pub processed_count: usize,
    /// Item count per tier after assignment
    pub tier_breakdown: BTreeMap<Tier, usize>,
    /// `tokens_after / tokens_before`, in `(0, 1]`
    pub compression_ratio: f64,
    /// Tokens across the memories that were summarized
    pub tokens_before: usize,
    /// Tokens across the summaries that replaced them
    pub tokens_after: usize,
    pub tokens_saved: usize,
    pub summaries: Vec<Summary>,
    pub errors: Vec<BatchError>,
    /// Every processed memory with its tier, newest-first
    #[serde(skip)]
    pub assignments: Vec<ScoredMemory>,
}

impl CompressionRunResult {
    /// Result for a run that summarized nothing
    pub fn noop(assignments: Vec<ScoredMemory>, tier_breakdown: BTreeMap<Tier, usize>) -> Self {
        Self {
            processed_count: assignments.len(),
            tier_breakdown,
            compression_ratio: 1.0,
            assignments,
            ..Default::default()
        }
    }

    /// Fill in the token figures from the summarized and produced token counts
    pub(crate) fn set_tokens(&mut self, before: usize, after: usize) {
        self.tokens_before = before;
        self.tokens_after = after;
        self.tokens_saved = before.saturating_sub(after);
        self.compression_ratio = compression_ratio(before, after);
    }

    /// Number of summaries produced by `strategy`
    pub fn strategy_count(&self, strategy: SummaryStrategy) -> usize {
        self.summaries
            .iter()
            .filter(|s| s.strategy_used == strategy)
            .count()
    }

    /// Memories that remain in the working set, newest-first
    pub fn live_items(&self) -> impl Iterator<Item = &ScoredMemory> {
        self.assignments.iter().filter(|s| !s.compressed)
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// `after / before`, clamped into `(0, 1]`. Nothing summarized reports 1.
pub fn compression_ratio(before: usize, after: usize) -> f64 {
    if before == 0 {
        return 1.0;
    }
    (after as f64 / before as f64).clamp(f64::EPSILON, 1.0)
}
