//! Summarizer types
//!
//! Defines the batch handed to a summarizer, its output, and
//! summarizer-specific errors.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::backend::BackendError;
use crate::memory::types::{ScoredMemory, SummaryStrategy, Tier};

/// Memories from one tier submitted to a summarizer together.
///
/// Items are ordered oldest-first. A batch lives for one compression run.
#[derive(Debug, Clone)]
pub struct CompressionBatch {
    pub tier: Tier,
    pub items: Vec<ScoredMemory>,
    /// Desired summary size relative to the source, when the tier sets one
    pub target_ratio: Option<f32>,
}

impl CompressionBatch {
    pub fn new(tier: Tier, items: Vec<ScoredMemory>) -> Self {
        Self {
            tier,
            items,
            target_ratio: None,
        }
    }

    pub fn with_target_ratio(mut self, ratio: f32) -> Self {
        self.target_ratio = Some(ratio.clamp(0.0, 1.0));
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn source_ids(&self) -> BTreeSet<Uuid> {
        self.items.iter().map(|s| s.id()).collect()
    }

    /// Creation time of the oldest item
    pub fn earliest(&self) -> Option<DateTime<Utc>> {
        self.items.iter().map(|s| s.item.created_at).min()
    }

    /// Creation time of the newest item
    pub fn latest(&self) -> Option<DateTime<Utc>> {
        self.items.iter().map(|s| s.item.created_at).max()
    }

    /// All item contents, one per line, oldest-first
    pub fn concatenated_content(&self) -> String {
        self.items
            .iter()
            .map(|s| s.item.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Text produced by a summarizer and the strategy that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryOutput {
    pub text: String,
    pub strategy: SummaryStrategy,
}

impl SummaryOutput {
    pub fn new(text: impl Into<String>, strategy: SummaryStrategy) -> Self {
        Self {
            text: text.into(),
            strategy,
        }
    }
}

/// Summarizer-specific errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum SummarizeError {
    #[error("summarization timed out after {0:?}")]
    Timeout(Duration),
    #[error("backend failed: {0}")]
    Backend(#[from] BackendError),
    #[error("summarizer returned an empty response")]
    EmptyResponse,
    #[error("summarizer invariant violated: {0}")]
    Invariant(String),
}
