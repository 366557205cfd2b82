//! Summarizer module
//!
//! Collapses batches of memories into condensed text. Two interchangeable
//! strategies implement [`Summarizer`]: a generative one backed by a model,
//! and a deterministic rule-based fallback that never fails.

pub mod fallback;
pub mod generative;
pub mod prompts;
pub mod provider;
pub mod types;

pub use fallback::{ReductionLimits, RuleBasedSummarizer};
pub use generative::GenerativeSummarizer;
pub use provider::Summarizer;
pub use types::{CompressionBatch, SummarizeError, SummaryOutput};
