//! Memory module
//!
//! Memory records, importance scoring, token estimation and context assembly.

pub mod context;
pub mod scoring;
pub mod tokens;
pub mod types;

pub use context::{
    AssembledContext, ContextBudgetAssembler, ContextEntry, ContextSources, InclusionCount,
    UnitKind,
};
pub use scoring::{ImportanceScorer, MarkerClassifier, ScoreBreakdown, SignificanceClassifier};
pub use tokens::{CharRatioEstimator, TokenEstimator};
pub use types::{MemoryCategory, MemoryItem, ScoredMemory, Summary, SummaryStrategy, Tier};
