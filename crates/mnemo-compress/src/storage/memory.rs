//! In-process memory store
//!
//! Keeps raw memories and summaries behind async locks. Used by tests and by
//! embedders that persist elsewhere. Supports injecting write failures.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::memory::types::{MemoryItem, Summary, Tier};
use crate::storage::{MemoryStore, RawMemoryFilter, StoreAck, StoreError};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    raw: RwLock<Vec<MemoryItem>>,
    summaries: RwLock<Vec<Summary>>,
    pending_failures: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_raw(&self, item: MemoryItem) {
        self.raw.write().await.push(item);
    }

    pub async fn insert_raw_batch<I: IntoIterator<Item = MemoryItem>>(&self, items: I) {
        self.raw.write().await.extend(items);
    }

    /// Reject the next `n` summary writes
    pub fn fail_next_writes(&self, n: usize) {
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    /// Every stored summary in insertion order
    pub async fn all_summaries(&self) -> Vec<Summary> {
        self.summaries.read().await.clone()
    }

    pub async fn raw_count(&self) -> usize {
        self.raw.read().await.len()
    }

    fn take_failure(&self) -> bool {
        self.pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn store_summary(&self, summary: Summary) -> Result<StoreAck, StoreError> {
        if self.take_failure() {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }

        let mut summaries = self.summaries.write().await;
        for existing in summaries.iter().filter(|s| s.source_tier == summary.source_tier) {
            if existing.source_ids == summary.source_ids {
                debug!("Summary {} duplicates stored {}", summary.id, existing.id);
                return Ok(StoreAck::Duplicate);
            }
            if existing.overlaps(&summary) {
                return Err(StoreError::Overlap {
                    summary: summary.id,
                    existing: existing.id,
                    tier: summary.source_tier,
                });
            }
        }

        summaries.push(summary);
        Ok(StoreAck::Stored)
    }

    async fn query_raw_memories(
        &self,
        filter: &RawMemoryFilter,
    ) -> Result<Vec<MemoryItem>, StoreError> {
        let raw = self.raw.read().await;
        let mut matched: Vec<MemoryItem> =
            raw.iter().filter(|m| filter.matches(m)).cloned().collect();
        matched.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn query_summaries(
        &self,
        tier: Option<Tier>,
        limit: usize,
    ) -> Result<Vec<Summary>, StoreError> {
        let summaries = self.summaries.read().await;
        let mut matched: Vec<Summary> = summaries
            .iter()
            .filter(|s| tier.is_none_or(|t| s.source_tier == t))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            b.covers_to
                .cmp(&a.covers_to)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| b.id.cmp(&a.id))
        });
        matched.truncate(limit);
        Ok(matched)
    }
}
