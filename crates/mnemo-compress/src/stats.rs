//! Compression statistics
//!
//! Tracks the metrics of the most recent run plus running totals. The tracker
//! is a plain owned value; the engine keeps it behind its own lock.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::compaction::CompressionRunResult;
use crate::memory::types::{SummaryStrategy, Tier};

/// Metrics of one compression run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStats {
    pub processed_count: usize,
    pub compression_ratio: f64,
    pub tokens_saved: usize,
    pub tier_breakdown: BTreeMap<Tier, usize>,
    pub summaries_created: usize,
    pub generative_summaries: usize,
    pub fallback_summaries: usize,
    pub errors: usize,
    pub recorded_at: DateTime<Utc>,
}

impl RunStats {
    pub fn from_result(result: &CompressionRunResult, recorded_at: DateTime<Utc>) -> Self {
        Self {
            processed_count: result.processed_count,
            compression_ratio: result.compression_ratio,
            tokens_saved: result.tokens_saved,
            tier_breakdown: result.tier_breakdown.clone(),
            summaries_created: result.summaries.len(),
            generative_summaries: result.strategy_count(SummaryStrategy::Generative),
            fallback_summaries: result.strategy_count(SummaryStrategy::Fallback),
            errors: result.errors.len(),
            recorded_at,
        }
    }
}

/// Point-in-time view of the tracker
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// `None` until the first run is recorded
    pub last_run: Option<RunStats>,
    pub total_runs: u64,
    pub cumulative_tokens_saved: u64,
    pub cumulative_summaries: u64,
}

#[derive(Debug, Clone, Default)]
pub struct CompressionStatsTracker {
    snapshot: StatsSnapshot,
}

impl CompressionStatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished run; the last recorded run wins
    pub fn record(&mut self, result: &CompressionRunResult) {
        self.record_at(result, Utc::now());
    }

    pub fn record_at(&mut self, result: &CompressionRunResult, recorded_at: DateTime<Utc>) {
        let run = RunStats::from_result(result, recorded_at);
        self.snapshot.total_runs += 1;
        self.snapshot.cumulative_tokens_saved += run.tokens_saved as u64;
        self.snapshot.cumulative_summaries += run.summaries_created as u64;
        self.snapshot.last_run = Some(run);
    }

    pub fn latest(&self) -> StatsSnapshot {
        self.snapshot.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(saved: usize, ratio: f64) -> CompressionRunResult {
        CompressionRunResult {
            processed_count: 10,
            compression_ratio: ratio,
            tokens_saved: saved,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_tracker() {
        let snapshot = CompressionStatsTracker::new().latest();
        assert!(snapshot.last_run.is_none());
        assert_eq!(snapshot.total_runs, 0);
        assert_eq!(snapshot.cumulative_tokens_saved, 0);
    }

    #[test]
    fn test_last_write_wins_and_totals_accumulate() {
        let mut tracker = CompressionStatsTracker::new();
        tracker.record(&result(100, 0.4));
        tracker.record(&result(30, 0.8));

        let snapshot = tracker.latest();
        let last = snapshot.last_run.unwrap();
        assert_eq!(last.tokens_saved, 30);
        assert_eq!(last.compression_ratio, 0.8);
        assert_eq!(snapshot.total_runs, 2);
        assert_eq!(snapshot.cumulative_tokens_saved, 130);
    }

    #[test]
    fn test_recorded_at_is_kept() {
        let mut tracker = CompressionStatsTracker::new();
        let at = Utc::now() - chrono::Duration::hours(3);
        tracker.record_at(&result(1, 1.0), at);
        assert_eq!(tracker.latest().last_run.unwrap().recorded_at, at);
    }
}
