//! Context budget assembly
//!
//! Blends the live working set with stored summaries into a block of text
//! that fits a token budget. Units are taken whole, in priority order:
//! 1. live raw items, newest-first
//! 2. live uncompressed recent items, newest-first
//! 3. recent summaries, newest-first
//! 4. archive summaries, newest-first
//!
//! Filling stops at the first unit that does not fit.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::memory::tokens::{CharRatioEstimator, TokenEstimator};
use crate::memory::types::{MemoryItem, ScoredMemory, Summary, Tier};

/// Kind of unit placed into a context, in fill order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    RawItem,
    RecentItem,
    RecentSummary,
    ArchiveSummary,
}

impl UnitKind {
    pub const ALL: [UnitKind; 4] = [
        UnitKind::RawItem,
        UnitKind::RecentItem,
        UnitKind::RecentSummary,
        UnitKind::ArchiveSummary,
    ];
}

/// Everything the assembler may draw from
#[derive(Debug, Clone, Default)]
pub struct ContextSources {
    pub raw: Vec<MemoryItem>,
    pub recent: Vec<MemoryItem>,
    pub recent_summaries: Vec<Summary>,
    pub archive_summaries: Vec<Summary>,
}

impl ContextSources {
    /// Split a working set and a summary list into sources.
    ///
    /// Compressed items and live archive items are skipped; summaries from the
    /// raw tier never exist and are ignored.
    pub fn from_parts(live: &[ScoredMemory], summaries: &[Summary]) -> Self {
        let mut sources = Self::default();
        for scored in live.iter().filter(|s| !s.compressed) {
            match scored.tier {
                Tier::Raw => sources.raw.push(scored.item.clone()),
                Tier::Recent => sources.recent.push(scored.item.clone()),
                Tier::Archive => {}
            }
        }
        for summary in summaries {
            match summary.source_tier {
                Tier::Recent => sources.recent_summaries.push(summary.clone()),
                Tier::Archive => sources.archive_summaries.push(summary.clone()),
                Tier::Raw => {}
            }
        }
        sources
    }

    fn available(&self, kind: UnitKind) -> usize {
        match kind {
            UnitKind::RawItem => self.raw.len(),
            UnitKind::RecentItem => self.recent.len(),
            UnitKind::RecentSummary => self.recent_summaries.len(),
            UnitKind::ArchiveSummary => self.archive_summaries.len(),
        }
    }
}

/// One unit placed into the context
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextEntry {
    pub kind: UnitKind,
    /// Memory id for items, summary id for summaries
    pub id: Uuid,
    pub text: String,
    /// Creation time for items, newest covered time for summaries
    pub at: DateTime<Utc>,
    pub tokens: usize,
}

/// How many units of one kind made it in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InclusionCount {
    pub included: usize,
    pub available: usize,
}

/// A token-bounded context block
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssembledContext {
    pub entries: Vec<ContextEntry>,
    pub token_budget: usize,
    /// Sum of entry token estimates; never exceeds `token_budget`
    pub tokens_used: usize,
    pub counts: BTreeMap<UnitKind, InclusionCount>,
    /// True when at least one available unit was left out
    pub truncated: bool,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries joined by blank lines, in fill order
    pub fn text(&self) -> String {
        self.entries
            .iter()
            .map(|e| e.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn included(&self, kind: UnitKind) -> usize {
        self.counts.get(&kind).map_or(0, |c| c.included)
    }
}

/// Fills a token budget from live items and summaries
#[derive(Clone)]
pub struct ContextBudgetAssembler {
    estimator: Arc<dyn TokenEstimator>,
}

impl Default for ContextBudgetAssembler {
    fn default() -> Self {
        Self::new(Arc::new(CharRatioEstimator::default()))
    }
}

impl std::fmt::Debug for ContextBudgetAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextBudgetAssembler").finish_non_exhaustive()
    }
}

impl ContextBudgetAssembler {
    pub fn new(estimator: Arc<dyn TokenEstimator>) -> Self {
        Self { estimator }
    }

    /// Assemble a context of at most `token_budget` estimated tokens
    pub fn assemble(&self, sources: &ContextSources, token_budget: usize) -> AssembledContext {
        let mut context = AssembledContext {
            token_budget,
            counts: UnitKind::ALL
                .iter()
                .map(|kind| {
                    (
                        *kind,
                        InclusionCount {
                            included: 0,
                            available: sources.available(*kind),
                        },
                    )
                })
                .collect(),
            ..Default::default()
        };

        let candidates = newest_items(UnitKind::RawItem, &sources.raw)
            .into_iter()
            .chain(newest_items(UnitKind::RecentItem, &sources.recent))
            .chain(newest_summaries(UnitKind::RecentSummary, &sources.recent_summaries))
            .chain(newest_summaries(UnitKind::ArchiveSummary, &sources.archive_summaries));

        for mut entry in candidates {
            entry.tokens = self.estimator.estimate(&entry.text);
            if context.tokens_used + entry.tokens > token_budget {
                break;
            }
            context.tokens_used += entry.tokens;
            if let Some(count) = context.counts.get_mut(&entry.kind) {
                count.included += 1;
            }
            context.entries.push(entry);
        }

        let available: usize = context.counts.values().map(|c| c.available).sum();
        context.truncated = context.entries.len() < available;
        context
    }
}

fn newest_items(kind: UnitKind, items: &[MemoryItem]) -> Vec<ContextEntry> {
    let mut sorted: Vec<&MemoryItem> = items.iter().collect();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
    sorted
        .into_iter()
        .map(|item| ContextEntry {
            kind,
            id: item.id,
            text: item.content.clone(),
            at: item.created_at,
            tokens: 0,
        })
        .collect()
}

fn newest_summaries(kind: UnitKind, summaries: &[Summary]) -> Vec<ContextEntry> {
    let mut sorted: Vec<&Summary> = summaries.iter().collect();
    sorted.sort_by(|a, b| {
        b.covers_to
            .cmp(&a.covers_to)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| b.id.cmp(&a.id))
    });
    sorted
        .into_iter()
        .map(|summary| ContextEntry {
            kind,
            id: summary.id,
            text: summary.text.clone(),
            at: summary.covers_to,
            tokens: 0,
        })
        .collect()
}
