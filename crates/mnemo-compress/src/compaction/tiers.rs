//! Tier assignment for scored memories
//!
//! Routes a newest-first sequence of scored memories into the Raw, Recent and
//! Archive tiers and decides which of them are summarized this run:
//! - the newest `raw_capacity` items stay Raw
//! - the next `recent_capacity` items are Recent; the oldest
//!   `ceil(recent_ratio × recent_count)` of them are compressed
//! - everything older is Archive and is compressed in full
//!
//! No I/O happens here. The plan is a pure function of its inputs.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use uuid::Uuid;

use crate::config::CompressionConfig;
use crate::memory::types::{ScoredMemory, Tier};

/// Tier capacities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierCapacities {
    pub raw: usize,
    pub recent: usize,
}

/// Compression ratios per tier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierRatios {
    /// Share of the recent overflow compressed per run
    pub recent: f32,
    /// Target output/input size for archive summaries
    pub archive: f32,
}

/// Tier routing policy
#[derive(Debug, Clone, PartialEq)]
pub struct TierPolicy {
    pub capacities: TierCapacities,
    pub ratios: TierRatios,
    /// Recent items scoring at or above this stay uncompressed
    pub preserve_score_threshold: Option<f32>,
}

impl TierPolicy {
    pub fn new(capacities: TierCapacities, ratios: TierRatios) -> Self {
        Self {
            capacities,
            ratios,
            preserve_score_threshold: None,
        }
    }

    pub fn from_config(config: &CompressionConfig) -> Self {
        Self {
            capacities: TierCapacities {
                raw: config.raw_capacity,
                recent: config.recent_capacity,
            },
            ratios: TierRatios {
                recent: config.recent_compress_ratio,
                archive: config.archive_compress_ratio,
            },
            preserve_score_threshold: config.preserve_score_threshold,
        }
    }

    /// Assign tiers to memories already sorted newest-first.
    ///
    /// See [`sort_newest_first`] for the expected ordering.
    pub fn assign(&self, scored_newest_first: Vec<ScoredMemory>) -> TierPlan {
        let total = scored_newest_first.len();
        let raw_end = total.min(self.capacities.raw);
        let recent_end = total.min(self.capacities.raw.saturating_add(self.capacities.recent));
        let recent_count = recent_end - raw_end;

        let recent_quota = ratio_count(self.ratios.recent, recent_count);
        let recent_compress_start = recent_end - recent_quota;

        let mut assignments = scored_newest_first;
        let mut recent_ids = Vec::new();
        let mut archive_ids = Vec::new();

        for (index, scored) in assignments.iter_mut().enumerate() {
            scored.compressed = false;
            if index < raw_end {
                scored.tier = Tier::Raw;
            } else if index < recent_end {
                scored.tier = Tier::Recent;
                if index >= recent_compress_start && !self.is_preserved(scored) {
                    recent_ids.push(scored.id());
                }
            } else {
                scored.tier = Tier::Archive;
                archive_ids.push(scored.id());
            }
        }

        // Oldest first, the order batches are built and summarized in
        recent_ids.reverse();
        archive_ids.reverse();

        TierPlan {
            assignments,
            recent_ids,
            archive_ids,
        }
    }

    fn is_preserved(&self, scored: &ScoredMemory) -> bool {
        self.preserve_score_threshold
            .is_some_and(|threshold| scored.score >= threshold)
    }
}

/// `ceil(ratio × count)`, capped at `count`.
///
/// The ratio is rounded to six decimals first, so `0.3f32` counts as exactly 0.3.
fn ratio_count(ratio: f32, count: usize) -> usize {
    if count == 0 || ratio <= 0.0 {
        return 0;
    }
    let ratio = (f64::from(ratio) * 1e6).round() / 1e6;
    let product = ratio * count as f64;
    let raw = (product - product.abs() * 1e-12).ceil();
    (raw.max(0.0) as usize).min(count)
}

/// Order memories newest-first.
///
/// Equal timestamps are broken by higher score, then by id, so the ordering
/// (and therefore the partitioning) is stable across runs.
pub fn sort_newest_first(items: &mut [ScoredMemory]) {
    items.sort_by(newest_first);
}

fn newest_first(a: &ScoredMemory, b: &ScoredMemory) -> Ordering {
    b.item
        .created_at
        .cmp(&a.item.created_at)
        .then_with(|| b.score.total_cmp(&a.score))
        .then_with(|| b.item.id.cmp(&a.item.id))
}

/// Outcome of tier assignment
#[derive(Debug, Clone)]
pub struct TierPlan {
    /// Every input memory with its tier, newest-first
    pub assignments: Vec<ScoredMemory>,
    recent_ids: Vec<Uuid>,
    archive_ids: Vec<Uuid>,
}

impl TierPlan {
    /// True when nothing needs compressing
    pub fn is_noop(&self) -> bool {
        self.recent_ids.is_empty() && self.archive_ids.is_empty()
    }

    /// Item count per tier; every tier is present, possibly with zero
    pub fn tier_breakdown(&self) -> BTreeMap<Tier, usize> {
        let mut breakdown: BTreeMap<Tier, usize> = Tier::ALL.iter().map(|t| (*t, 0)).collect();
        for scored in &self.assignments {
            *breakdown.entry(scored.tier).or_default() += 1;
        }
        breakdown
    }

    /// Keep `covered` memories in their tiers but out of every compression set.
    ///
    /// They are marked compressed, as a stored summary already stands in for them.
    pub fn exclude_covered(&mut self, covered: &HashSet<Uuid>) {
        if covered.is_empty() {
            return;
        }
        self.recent_ids.retain(|id| !covered.contains(id));
        self.archive_ids.retain(|id| !covered.contains(id));
        for scored in self.assignments.iter_mut() {
            if covered.contains(&scored.id()) {
                scored.compressed = true;
            }
        }
    }

    /// Ids marked for compression in `tier`, oldest-first
    pub fn compression_ids(&self, tier: Tier) -> &[Uuid] {
        match tier {
            Tier::Raw => &[],
            Tier::Recent => &self.recent_ids,
            Tier::Archive => &self.archive_ids,
        }
    }

    /// Memories marked for compression in `tier`, oldest-first
    pub fn compression_set(&self, tier: Tier) -> Vec<ScoredMemory> {
        let ids: HashSet<Uuid> = self.compression_ids(tier).iter().copied().collect();
        self.assignments
            .iter()
            .rev()
            .filter(|s| ids.contains(&s.id()))
            .cloned()
            .collect()
    }
}
