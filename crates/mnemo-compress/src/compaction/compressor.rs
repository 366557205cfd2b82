//! Memory compressor
//!
//! Runs one compression pass over a set of raw memories:
//! score → sort newest-first → tier → batch → summarize → package.
//!
//! Each batch is summarized by the primary (generative) summarizer when one
//! is configured, under the configured timeout. Any primary failure falls
//! through to the rule-based summarizer, which is expected never to fail. If
//! it does, the batch is reported as an invariant violation and its items stay
//! uncompressed.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::compaction::result::{BatchError, BatchErrorKind, CompressionRunResult};
use crate::compaction::tiers::{TierPlan, TierPolicy, sort_newest_first};
use crate::config::CompressionConfig;
use crate::error::Result;
use crate::memory::scoring::ImportanceScorer;
use crate::memory::tokens::{CharRatioEstimator, TokenEstimator};
use crate::memory::types::{MemoryItem, Summary, Tier};
use crate::storage::{MemoryStore, StoreAck, StoreError};
use crate::summarizer::{
    CompressionBatch, RuleBasedSummarizer, SummarizeError, Summarizer, SummaryOutput,
};

/// Receives each summary as soon as its batch completes
#[async_trait]
pub trait SummarySink: Send + Sync {
    async fn accept(&self, summary: &Summary) -> std::result::Result<(), StoreError>;
}

#[async_trait]
impl<S: MemoryStore + ?Sized> SummarySink for Arc<S> {
    async fn accept(&self, summary: &Summary) -> std::result::Result<(), StoreError> {
        match self.store_summary(summary.clone()).await? {
            StoreAck::Stored => debug!(
                "Stored summary {} ({} sources)",
                summary.id,
                summary.source_ids.len()
            ),
            StoreAck::Duplicate => debug!("Summary {} already stored, skipping", summary.id),
        }
        Ok(())
    }
}

/// What happened to one batch
enum BatchOutcome {
    Summarized { summary: Summary, tokens_before: usize },
    Failed(BatchError),
}

/// Compresses raw memories into tiered summaries
pub struct MemoryCompressor {
    scorer: ImportanceScorer,
    primary: Option<Arc<dyn Summarizer>>,
    fallback: Arc<dyn Summarizer>,
    estimator: Arc<dyn TokenEstimator>,
}

impl MemoryCompressor {
    /// Create a compressor that only uses the rule-based summarizer
    pub fn new(scorer: ImportanceScorer) -> Self {
        Self {
            scorer,
            primary: None,
            fallback: Arc::new(RuleBasedSummarizer::new()),
            estimator: Arc::new(CharRatioEstimator::default()),
        }
    }

    /// Try this summarizer first for every batch
    pub fn with_primary(mut self, primary: Arc<dyn Summarizer>) -> Self {
        self.primary = Some(primary);
        self
    }

    /// Replace the summarizer used when the primary fails
    pub fn with_fallback(mut self, fallback: Arc<dyn Summarizer>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_token_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn estimator(&self) -> &Arc<dyn TokenEstimator> {
        &self.estimator
    }

    pub fn scorer(&self) -> &ImportanceScorer {
        &self.scorer
    }

    /// Compress `raw` using the current time
    pub async fn compress(
        &self,
        raw: &[MemoryItem],
        config: &CompressionConfig,
    ) -> Result<CompressionRunResult> {
        self.compress_at(raw, config, Utc::now()).await
    }

    /// Compress `raw` as of `now`
    pub async fn compress_at(
        &self,
        raw: &[MemoryItem],
        config: &CompressionConfig,
        now: DateTime<Utc>,
    ) -> Result<CompressionRunResult> {
        self.compress_with_sink(raw, config, now, &HashSet::new(), None)
            .await
    }

    /// Score and tier `raw` without summarizing anything
    pub fn plan(
        &self,
        raw: &[MemoryItem],
        config: &CompressionConfig,
        now: DateTime<Utc>,
    ) -> Result<TierPlan> {
        config.validate()?;
        let items = dedup_by_id(raw);
        let mut scored = self.scorer.score_all(&items, now);
        sort_newest_first(&mut scored);
        Ok(TierPolicy::from_config(config).assign(scored))
    }

    /// Compress `raw` as of `now`, handing each summary to `sink` as it is produced.
    ///
    /// Memories in `covered` keep their tier but are never batched; they count
    /// as compressed. A summary the sink rejects is left out of the result and
    /// its items stay uncompressed.
    pub async fn compress_with_sink(
        &self,
        raw: &[MemoryItem],
        config: &CompressionConfig,
        now: DateTime<Utc>,
        covered: &HashSet<Uuid>,
        sink: Option<&dyn SummarySink>,
    ) -> Result<CompressionRunResult> {
        let mut plan = self.plan(raw, config, now)?;
        plan.exclude_covered(covered);
        let tier_breakdown = plan.tier_breakdown();

        if plan.is_noop() {
            debug!("Nothing to compress across {} memories", plan.assignments.len());
            return Ok(CompressionRunResult::noop(plan.assignments, tier_breakdown));
        }

        let batches = build_batches(&plan, config);
        info!(
            "Compressing {} recent and {} archive memories in {} batches",
            plan.compression_ids(Tier::Recent).len(),
            plan.compression_ids(Tier::Archive).len(),
            batches.len()
        );

        let timeout = Duration::from_millis(config.generative_timeout_ms);
        let outcomes: Vec<BatchOutcome> = stream::iter(batches)
            .map(|batch| self.run_batch(batch, timeout, now, sink))
            .buffered(config.max_concurrency)
            .collect()
            .await;

        let mut assignments = plan.assignments;
        let mut result = CompressionRunResult {
            processed_count: assignments.len(),
            tier_breakdown,
            ..Default::default()
        };

        let mut compressed: HashSet<Uuid> = HashSet::new();
        let mut tokens_before = 0;
        let mut tokens_after = 0;
        for outcome in outcomes {
            match outcome {
                BatchOutcome::Summarized {
                    summary,
                    tokens_before: before,
                } => {
                    tokens_before += before;
                    tokens_after += summary.token_count_estimate;
                    compressed.extend(summary.source_ids.iter().copied());
                    result.summaries.push(summary);
                }
                BatchOutcome::Failed(err) => result.errors.push(err),
            }
        }

        for scored in assignments.iter_mut() {
            scored.compressed |= compressed.contains(&scored.id());
        }
        result.assignments = assignments;
        result.set_tokens(tokens_before, tokens_after);

        info!(
            "Compression run finished: {} summaries, {} errors, ratio {:.3}, {} tokens saved",
            result.summaries.len(),
            result.errors.len(),
            result.compression_ratio,
            result.tokens_saved
        );

        Ok(result)
    }

    async fn run_batch(
        &self,
        batch: CompressionBatch,
        timeout: Duration,
        now: DateTime<Utc>,
        sink: Option<&dyn SummarySink>,
    ) -> BatchOutcome {
        let output = match self.summarize_batch(&batch, timeout).await {
            Ok(output) => output,
            Err(message) => {
                error!(
                    "No summary for {} {} memories: {}",
                    batch.len(),
                    batch.tier,
                    message
                );
                let err = batch_error(&batch, BatchErrorKind::InvariantViolation, message);
                return BatchOutcome::Failed(err);
            }
        };

        let summary = Summary {
            id: Uuid::new_v4(),
            source_tier: batch.tier,
            source_ids: batch.source_ids(),
            token_count_estimate: self.estimator.estimate(&output.text),
            text: output.text,
            strategy_used: output.strategy,
            created_at: now,
            covers_from: batch.earliest().unwrap_or(now),
            covers_to: batch.latest().unwrap_or(now),
        };

        if let Some(sink) = sink {
            if let Err(e) = sink.accept(&summary).await {
                warn!(
                    "Failed to persist summary of {} {} memories: {}",
                    batch.len(),
                    batch.tier,
                    e
                );
                let err = batch_error(&batch, BatchErrorKind::Persistence, e.to_string());
                return BatchOutcome::Failed(err);
            }
        }

        let tokens_before = batch
            .items
            .iter()
            .map(|s| self.estimator.estimate(&s.item.content))
            .sum();

        BatchOutcome::Summarized { summary, tokens_before }
    }

    /// Primary under `timeout`, then fallback. `Err` only when the fallback fails.
    async fn summarize_batch(
        &self,
        batch: &CompressionBatch,
        timeout: Duration,
    ) -> std::result::Result<SummaryOutput, String> {
        if let Some(primary) = &self.primary {
            match try_summarizer(primary.as_ref(), batch, timeout).await {
                Ok(output) => return Ok(output),
                Err(e) => warn!("{} summarizer failed, using fallback: {}", primary.name(), e),
            }
        }

        match self.fallback.summarize(batch).await {
            Ok(output) if !output.text.trim().is_empty() => Ok(output),
            Ok(_) => Err(format!("{} summarizer returned empty text", self.fallback.name())),
            Err(e) => Err(format!("{} summarizer failed: {}", self.fallback.name(), e)),
        }
    }
}

impl std::fmt::Debug for MemoryCompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCompressor")
            .field("scorer", &self.scorer)
            .field("primary", &self.primary.as_ref().map(|p| p.name()))
            .field("fallback", &self.fallback.name())
            .finish_non_exhaustive()
    }
}

/// Split each tier's compression set oldest-first into batches of at most `max_batch_size`
fn build_batches(plan: &TierPlan, config: &CompressionConfig) -> Vec<CompressionBatch> {
    let mut batches = Vec::new();
    for tier in [Tier::Recent, Tier::Archive] {
        let set = plan.compression_set(tier);
        for chunk in set.chunks(config.max_batch_size) {
            let batch = CompressionBatch::new(tier, chunk.to_vec());
            batches.push(match tier {
                Tier::Archive => batch.with_target_ratio(config.archive_compress_ratio),
                Tier::Raw | Tier::Recent => batch,
            });
        }
    }
    batches
}

/// Run `summarizer` under `timeout`, treating blank text as a failure
async fn try_summarizer(
    summarizer: &dyn Summarizer,
    batch: &CompressionBatch,
    timeout: Duration,
) -> std::result::Result<SummaryOutput, SummarizeError> {
    let output = tokio::time::timeout(timeout, summarizer.summarize(batch))
        .await
        .map_err(|_| SummarizeError::Timeout(timeout))??;
    if output.text.trim().is_empty() {
        return Err(SummarizeError::EmptyResponse);
    }
    Ok(output)
}

fn batch_error(batch: &CompressionBatch, kind: BatchErrorKind, message: String) -> BatchError {
    BatchError {
        tier: batch.tier,
        source_ids: batch.items.iter().map(|s| s.id()).collect(),
        kind,
        message,
    }
}

/// Drop repeated ids, keeping the first occurrence
fn dedup_by_id(raw: &[MemoryItem]) -> Vec<MemoryItem> {
    let mut seen: HashSet<Uuid> = HashSet::with_capacity(raw.len());
    raw.iter()
        .filter(|item| seen.insert(item.id))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringConfig;
    use crate::memory::types::{MemoryCategory, SummaryStrategy};
    use crate::storage::InMemoryStore;
    use crate::summarizer::GenerativeSummarizer;
    use crate::testing::{ScriptedBackend, memories, memories_ending_at};

    fn compressor() -> MemoryCompressor {
        MemoryCompressor::new(ImportanceScorer::new(ScoringConfig::default()).unwrap())
    }

    fn generative(backend: ScriptedBackend) -> Arc<dyn Summarizer> {
        Arc::new(GenerativeSummarizer::new(Arc::new(backend)))
    }

    struct BrokenSummarizer;

    #[async_trait]
    impl Summarizer for BrokenSummarizer {
        async fn summarize(
            &self,
            _batch: &CompressionBatch,
        ) -> std::result::Result<SummaryOutput, SummarizeError> {
            Err(SummarizeError::Invariant("broken".into()))
        }

        fn strategy(&self) -> SummaryStrategy {
            SummaryStrategy::Fallback
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_small_corpus_is_noop() {
        let result = compressor()
            .compress(&memories(12), &CompressionConfig::default())
            .await
            .unwrap();
        assert_eq!(result.processed_count, 12);
        assert!(result.summaries.is_empty());
        assert_eq!(result.compression_ratio, 1.0);
        assert_eq!(result.tokens_saved, 0);
        assert_eq!(result.live_items().count(), 12);
    }

    #[tokio::test]
    async fn test_overflow_compresses_oldest_recent_items() {
        let items = memories(25);
        let oldest_two: std::collections::BTreeSet<Uuid> =
            items[..2].iter().map(|m| m.id).collect();

        let result = compressor()
            .compress(&items, &CompressionConfig::default())
            .await
            .unwrap();

        assert_eq!(result.summaries.len(), 1);
        let summary = &result.summaries[0];
        assert_eq!(summary.source_tier, Tier::Recent);
        assert_eq!(summary.source_ids, oldest_two);
        assert_eq!(summary.strategy_used, SummaryStrategy::Fallback);
        assert_eq!(result.tier_breakdown[&Tier::Raw], 20);
        assert_eq!(result.tier_breakdown[&Tier::Recent], 5);

        let live_recent = result
            .live_items()
            .filter(|s| s.tier == Tier::Recent)
            .count();
        assert_eq!(live_recent, 3);
    }

    #[tokio::test]
    async fn test_generative_failure_falls_back() {
        let backend = ScriptedBackend::failing();
        let result = compressor()
            .with_primary(generative(backend))
            .compress(&memories(30), &CompressionConfig::default())
            .await
            .unwrap();

        assert!(!result.summaries.is_empty());
        assert!(result.errors.is_empty());
        assert!(result
            .summaries
            .iter()
            .all(|s| s.strategy_used == SummaryStrategy::Fallback));
    }

    #[tokio::test]
    async fn test_generative_success_is_reported() {
        let result = compressor()
            .with_primary(generative(ScriptedBackend::echo()))
            .compress(&memories(25), &CompressionConfig::default())
            .await
            .unwrap();
        assert_eq!(result.strategy_count(SummaryStrategy::Generative), 1);
        assert_eq!(result.summaries[0].text, "summary of 2 memories");
    }

    #[tokio::test]
    async fn test_timeout_yields_single_fallback_summary() {
        let config = CompressionConfig::default()
            .with_capacities(1, 10)
            .with_ratios(1.0, 0.1)
            .with_timeout_ms(50);
        let items = memories(11);
        let backend = Arc::new(ScriptedBackend::hanging(Duration::from_secs(10)));

        let result = compressor()
            .with_primary(Arc::new(GenerativeSummarizer::new(backend.clone())))
            .compress(&items, &config)
            .await
            .unwrap();

        assert_eq!(result.summaries.len(), 1);
        let summary = &result.summaries[0];
        assert_eq!(summary.strategy_used, SummaryStrategy::Fallback);
        assert_eq!(summary.source_ids.len(), 10);
        assert!(!summary.source_ids.contains(&items[10].id));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_partitions_are_idempotent() {
        let now = Utc::now();
        let items = memories_ending_at(180, now);
        let config = CompressionConfig::default().with_max_batch_size(7);

        let first = compressor().compress_at(&items, &config, now).await.unwrap();
        let second = compressor().compress_at(&items, &config, now).await.unwrap();

        let partitions = |r: &CompressionRunResult| {
            r.summaries
                .iter()
                .map(|s| (s.source_tier, s.source_ids.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(partitions(&first), partitions(&second));
        assert_eq!(first.tier_breakdown, second.tier_breakdown);
    }

    #[tokio::test]
    async fn test_source_ids_are_disjoint_and_batched() {
        let config = CompressionConfig::default()
            .with_capacities(5, 10)
            .with_max_batch_size(4);
        let result = compressor().compress(&memories(40), &config).await.unwrap();

        // 3 recent ids in one batch, 25 archive ids in batches of 4
        assert_eq!(result.tier_breakdown[&Tier::Archive], 25);
        assert_eq!(result.summaries.len(), 1 + 7);
        assert!(result.summaries.iter().all(|s| s.source_ids.len() <= 4));

        let mut seen = HashSet::new();
        for summary in &result.summaries {
            for id in &summary.source_ids {
                assert!(seen.insert(*id), "id {id} summarized twice");
            }
        }
        assert_eq!(seen.len(), 28);
    }

    #[tokio::test]
    async fn test_ratio_and_savings_bounds() {
        for n in [0, 5, 21, 25, 60, 150, 400] {
            let result = compressor()
                .compress(&memories(n), &CompressionConfig::default())
                .await
                .unwrap();
            assert!(result.compression_ratio > 0.0 && result.compression_ratio <= 1.0);
            assert_eq!(
                result.tokens_saved,
                result.tokens_before.saturating_sub(result.tokens_after)
            );
            assert_eq!(result.tier_breakdown.values().sum::<usize>(), n);
        }
    }

    #[tokio::test]
    async fn test_broken_fallback_is_invariant_violation() {
        let result = compressor()
            .with_primary(generative(ScriptedBackend::failing()))
            .with_fallback(Arc::new(BrokenSummarizer))
            .compress(&memories(25), &CompressionConfig::default())
            .await
            .unwrap();

        assert!(result.summaries.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, BatchErrorKind::InvariantViolation);
        assert_eq!(result.errors[0].source_ids.len(), 2);
        assert_eq!(result.live_items().count(), 25);
        assert_eq!(result.compression_ratio, 1.0);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_scoring() {
        let config = CompressionConfig::default().with_max_batch_size(0);
        let err = compressor().compress(&memories(30), &config).await.unwrap_err();
        assert!(matches!(err, crate::error::CompressError::Config(_)));
    }

    #[tokio::test]
    async fn test_duplicate_ids_processed_once() {
        let mut items = memories(10);
        items.push(items[3].clone());
        let result = compressor()
            .compress(&items, &CompressionConfig::default())
            .await
            .unwrap();
        assert_eq!(result.processed_count, 10);
    }

    #[tokio::test]
    async fn test_sink_failure_keeps_items_live() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_next_writes(1);
        let config = CompressionConfig::default().with_capacities(5, 10);

        let now = Utc::now();
        let result = compressor()
            .compress_with_sink(&memories(40), &config, now, &HashSet::new(), Some(&store))
            .await
            .unwrap();

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, BatchErrorKind::Persistence);
        let failed: HashSet<Uuid> = result.errors[0].source_ids.iter().copied().collect();
        assert!(result
            .assignments
            .iter()
            .filter(|s| failed.contains(&s.id()))
            .all(|s| !s.compressed));
        assert_eq!(store.all_summaries().await.len(), result.summaries.len());
    }

    #[tokio::test]
    async fn test_covered_items_hold_their_tier() {
        let now = Utc::now();
        let items = memories_ending_at(25, now);
        let config = CompressionConfig::default();
        let first = compressor().compress_at(&items, &config, now).await.unwrap();
        let covered: HashSet<Uuid> = first.summaries[0].source_ids.iter().copied().collect();

        let second = compressor()
            .compress_with_sink(&items, &config, now, &covered, None)
            .await
            .unwrap();

        assert!(second.summaries.is_empty());
        assert_eq!(second.processed_count, 25);
        assert_eq!(second.tier_breakdown, first.tier_breakdown);
        assert_eq!(second.compression_ratio, 1.0);
        let live: HashSet<Uuid> = second.live_items().map(|s| s.id()).collect();
        assert_eq!(live.len(), 23);
        assert!(covered.iter().all(|id| !live.contains(id)));
    }

    #[tokio::test]
    async fn test_primary_timeout_is_reported_as_timeout() {
        let summarizer = GenerativeSummarizer::new(Arc::new(ScriptedBackend::hanging(
            Duration::from_secs(10),
        )));
        let batch = crate::testing::scored_batch(Tier::Recent, 3);

        let err = try_summarizer(&summarizer, &batch, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizeError::Timeout(d) if d == Duration::from_millis(20)));

        let empty = GenerativeSummarizer::new(Arc::new(ScriptedBackend::reply("   ")));
        let err = try_summarizer(&empty, &batch, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizeError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_archive_summaries_are_coarser() {
        let config = CompressionConfig::default().with_capacities(2, 20);
        let items: Vec<MemoryItem> = (0..80)
            .map(|i| {
                MemoryItem::at(
                    format!("Entry {i}: {}", "detailed trace of the migration rollout ".repeat(3)),
                    MemoryCategory::Observation,
                    Utc::now() - chrono::Duration::minutes(80 - i),
                )
            })
            .collect();
        let result = compressor().compress(&items, &config).await.unwrap();

        let archive: Vec<&Summary> = result
            .summaries
            .iter()
            .filter(|s| s.source_tier == Tier::Archive)
            .collect();
        assert_eq!(archive.len(), 2);
        for summary in archive {
            let source_chars: usize = items
                .iter()
                .filter(|m| summary.source_ids.contains(&m.id))
                .map(|m| m.content.chars().count())
                .sum();
            assert!(summary.text.chars().count() * 5 < source_chars);
        }
    }
}
