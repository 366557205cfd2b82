//! Storage module for raw memories and summaries
//!
//! The durable store is an external collaborator reached through
//! [`MemoryStore`]. Summaries are append-only: a store never edits or
//! replaces one, and never accepts a summary that partially overlaps a
//! stored summary from the same tier.

pub mod filter;
pub mod memory;

use async_trait::async_trait;

use crate::memory::types::{MemoryItem, Summary, Tier};

pub use filter::RawMemoryFilter;
pub use memory::InMemoryStore;

/// Storage-related errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The summary shares sources with a stored sibling from the same tier
    #[error("summary {summary} overlaps stored summary {existing} in the {tier} tier")]
    Overlap {
        summary: uuid::Uuid,
        existing: uuid::Uuid,
        tier: Tier,
    },
    /// The store refused or could not complete the write
    #[error("write rejected: {0}")]
    Rejected(String),
    /// The store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Acknowledgement of a summary write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreAck {
    /// Appended as a new summary
    Stored,
    /// An identical coverage set was already stored; nothing written
    Duplicate,
}

/// Persistence collaborator consumed by the engine
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Append a summary. Each call is atomic and independent of the others.
    async fn store_summary(&self, summary: Summary) -> Result<StoreAck, StoreError>;

    /// Raw memories matching `filter`, newest first
    async fn query_raw_memories(
        &self,
        filter: &RawMemoryFilter,
    ) -> Result<Vec<MemoryItem>, StoreError>;

    /// Stored summaries, newest first, optionally restricted to one tier
    async fn query_summaries(
        &self,
        tier: Option<Tier>,
        limit: usize,
    ) -> Result<Vec<Summary>, StoreError>;
}
