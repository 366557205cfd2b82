//! Rule-based fallback summarizer
//!
//! Produces a bullet-style reduction of a batch without any I/O:
//! - a header with the item count and covered time span
//! - per-category counts
//! - excerpts of the highest-scored items
//!
//! Archive batches get fewer, shorter excerpts and, when the batch carries a
//! target ratio, a character budget. The output is never longer than the
//! source text: if the reduction would not shrink anything, the source is
//! returned unchanged.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::memory::types::{MemoryCategory, ScoredMemory, SummaryStrategy, Tier};
use crate::summarizer::Summarizer;
use crate::summarizer::types::{CompressionBatch, SummarizeError, SummaryOutput};

/// Floor for the archive character budget so the header always fits
const MIN_BUDGET_CHARS: usize = 120;

/// Excerpt limits for one tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReductionLimits {
    /// Maximum number of excerpt bullets
    pub max_bullets: usize,
    /// Maximum characters per excerpt
    pub excerpt_chars: usize,
}

/// Deterministic summarizer that cannot fail
#[derive(Debug, Clone)]
pub struct RuleBasedSummarizer {
    pub recent: ReductionLimits,
    pub archive: ReductionLimits,
}

impl Default for RuleBasedSummarizer {
    fn default() -> Self {
        Self {
            recent: ReductionLimits {
                max_bullets: 5,
                excerpt_chars: 160,
            },
            archive: ReductionLimits {
                max_bullets: 3,
                excerpt_chars: 80,
            },
        }
    }
}

impl RuleBasedSummarizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn limits(&self, tier: Tier) -> ReductionLimits {
        match tier {
            Tier::Archive => self.archive,
            Tier::Raw | Tier::Recent => self.recent,
        }
    }

    /// Reduce a batch to condensed text
    pub fn reduce(&self, batch: &CompressionBatch) -> String {
        let (Some(earliest), Some(latest)) = (batch.earliest(), batch.latest()) else {
            return "[0 memories]".to_string();
        };

        let source = batch.concatenated_content();
        let source_chars = source.chars().count();
        let limits = self.limits(batch.tier);

        let budget = batch.target_ratio.map(|ratio| {
            ((source_chars as f64 * ratio as f64).ceil() as usize).max(MIN_BUDGET_CHARS)
        });

        let mut lines = vec![
            format!(
                "[{} memories, {} → {}]",
                batch.len(),
                earliest.format("%Y-%m-%d %H:%M"),
                latest.format("%Y-%m-%d %H:%M")
            ),
            format!("Categories: {}", category_counts(&batch.items)),
        ];
        let mut used: usize = lines.iter().map(|l| l.chars().count() + 1).sum();

        for scored in ranked(&batch.items).into_iter().take(limits.max_bullets) {
            let bullet = format!(
                "- ({}) {}",
                scored.item.category,
                excerpt(&scored.item.content, limits.excerpt_chars)
            );
            let cost = bullet.chars().count() + 1;
            if budget.is_some_and(|b| used + cost > b) {
                break;
            }
            used += cost;
            lines.push(bullet);
        }

        let reduced = lines.join("\n");
        if reduced.chars().count() >= source_chars && !source.trim().is_empty() {
            return source;
        }
        reduced
    }
}

#[async_trait]
impl Summarizer for RuleBasedSummarizer {
    async fn summarize(&self, batch: &CompressionBatch) -> Result<SummaryOutput, SummarizeError> {
        Ok(SummaryOutput::new(self.reduce(batch), SummaryStrategy::Fallback))
    }

    fn strategy(&self) -> SummaryStrategy {
        SummaryStrategy::Fallback
    }

    fn name(&self) -> &'static str {
        "rule-based"
    }
}

/// `decision: 2, observation: 1`, in category order
fn category_counts(items: &[ScoredMemory]) -> String {
    let mut counts: BTreeMap<MemoryCategory, usize> = BTreeMap::new();
    for scored in items {
        *counts.entry(scored.item.category).or_default() += 1;
    }
    counts
        .iter()
        .map(|(category, count)| format!("{category}: {count}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Highest score first; equal scores prefer the newer item
fn ranked(items: &[ScoredMemory]) -> Vec<&ScoredMemory> {
    let mut ranked: Vec<&ScoredMemory> = items.iter().collect();
    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.item.created_at.cmp(&a.item.created_at))
            .then_with(|| b.item.id.cmp(&a.item.id))
    });
    ranked
}

fn excerpt(content: &str, max_chars: usize) -> String {
    let flattened = content.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = flattened.chars().take(max_chars).collect();
    match truncated.chars().count().cmp(&flattened.chars().count()) {
        Ordering::Less => format!("{truncated}..."),
        _ => truncated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::MemoryItem;
    use crate::testing::scored_batch;
    use chrono::{Duration, Utc};

    fn long_batch(tier: Tier, n: usize) -> CompressionBatch {
        let now = Utc::now();
        let items = (0..n)
            .map(|i| {
                let item = MemoryItem::at(
                    format!(
                        "Step {i}: investigated the flaky integration suite, rebuilt caches, \
                         reran the pipeline and recorded timings for later comparison"
                    ),
                    if i % 2 == 0 {
                        MemoryCategory::Observation
                    } else {
                        MemoryCategory::Task
                    },
                    now - Duration::minutes((n - i) as i64),
                );
                ScoredMemory::new(item, i as f32 / n as f32)
            })
            .collect();
        CompressionBatch::new(tier, items)
    }

    #[test]
    fn test_reduce_has_header_counts_and_bullets() {
        let summarizer = RuleBasedSummarizer::new();
        let text = summarizer.reduce(&long_batch(Tier::Recent, 10));

        assert!(text.starts_with("[10 memories, "));
        assert!(text.contains("Categories: observation: 5, task: 5"));
        assert_eq!(text.lines().filter(|l| l.starts_with("- ")).count(), 5);
    }

    #[test]
    fn test_reduce_prefers_highest_scores() {
        let summarizer = RuleBasedSummarizer::new();
        let batch = long_batch(Tier::Recent, 10);
        let text = summarizer.reduce(&batch);
        // Scores rise with index, so the newest step leads
        let first_bullet = text.lines().find(|l| l.starts_with("- ")).unwrap();
        assert!(first_bullet.contains("Step 9"));
    }

    #[test]
    fn test_reduce_is_deterministic_and_shorter() {
        let summarizer = RuleBasedSummarizer::new();
        let batch = long_batch(Tier::Recent, 10);
        let first = summarizer.reduce(&batch);
        let second = summarizer.reduce(&batch);
        assert_eq!(first, second);
        assert!(first.chars().count() < batch.concatenated_content().chars().count());
    }

    #[test]
    fn test_archive_is_coarser_than_recent() {
        let summarizer = RuleBasedSummarizer::new();
        let recent = summarizer.reduce(&long_batch(Tier::Recent, 12));
        let archive = summarizer.reduce(&long_batch(Tier::Archive, 12).with_target_ratio(0.1));
        assert!(archive.chars().count() < recent.chars().count());
    }

    #[test]
    fn test_tiny_batch_returns_source() {
        let summarizer = RuleBasedSummarizer::new();
        let batch = CompressionBatch::new(
            Tier::Recent,
            vec![ScoredMemory::new(
                MemoryItem::new("ok", MemoryCategory::Task),
                0.1,
            )],
        );
        assert_eq!(summarizer.reduce(&batch), "ok");
    }

    #[test]
    fn test_empty_batch_never_fails() {
        let summarizer = RuleBasedSummarizer::new();
        let batch = CompressionBatch::new(Tier::Archive, Vec::new());
        assert_eq!(summarizer.reduce(&batch), "[0 memories]");
    }

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        assert_eq!(excerpt("héllo wörld", 5), "héllo...");
        assert_eq!(excerpt("short", 10), "short");
        assert_eq!(excerpt("a\n\n b", 10), "a b");
    }

    #[tokio::test]
    async fn test_summarize_reports_fallback_strategy() {
        let summarizer = RuleBasedSummarizer::new();
        let output = summarizer
            .summarize(&scored_batch(Tier::Recent, 10))
            .await
            .unwrap();
        assert_eq!(output.strategy, SummaryStrategy::Fallback);
        assert!(!output.text.is_empty());
        assert_eq!(summarizer.strategy(), SummaryStrategy::Fallback);
    }
}
