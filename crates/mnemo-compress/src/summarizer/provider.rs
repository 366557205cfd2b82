//! Summarizer trait
//!
//! Defines the single capability the compressor depends on. Generative and
//! rule-based summarization are interchangeable implementations of it.

use async_trait::async_trait;

use crate::memory::types::SummaryStrategy;
use crate::summarizer::types::{CompressionBatch, SummarizeError, SummaryOutput};

/// Collapses a batch of memories into condensed text
///
/// Implementations signal failure through `Err` rather than degrading
/// silently; choosing what to do on failure is the caller's job.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize a batch of memories from one tier
    async fn summarize(&self, batch: &CompressionBatch) -> Result<SummaryOutput, SummarizeError>;

    /// Strategy reported on summaries this summarizer produces
    fn strategy(&self) -> SummaryStrategy;

    /// Summarizer name for logging
    fn name(&self) -> &'static str;
}
