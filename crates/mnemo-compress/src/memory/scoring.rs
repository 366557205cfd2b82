//! Importance scoring for raw memories
//!
//! A memory's importance is a weighted sum of four sub-scores, each
//! normalized to `[0, 1]` before weighting:
//! - recency: exponential decay with a configurable half-life
//! - category: fixed base weight per [`MemoryCategory`]
//! - length: logarithmic, saturating at a configured character count
//! - significance: trigger phrases, or any [`SignificanceClassifier`]
//!
//! Scoring is pure: the caller supplies `now`, nothing is cached.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::{ConfigError, ScoringConfig, ScoringWeights};
use crate::memory::types::{MemoryCategory, MemoryItem, ScoredMemory};

/// Significance sub-score source.
///
/// Must return a value in `[0, 1]`; values outside are clamped.
pub trait SignificanceClassifier: Send + Sync {
    fn significance(&self, item: &MemoryItem) -> f32;
}

/// Counts case-insensitive trigger phrases in the content
#[derive(Debug, Clone)]
pub struct MarkerClassifier {
    markers: Vec<String>,
}

impl MarkerClassifier {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.as_ref().trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }
}

impl SignificanceClassifier for MarkerClassifier {
    fn significance(&self, item: &MemoryItem) -> f32 {
        let content_lower = item.content.to_lowercase();
        let matches = self
            .markers
            .iter()
            .filter(|marker| content_lower.contains(marker.as_str()))
            .count() as f32;

        (matches * 0.5).min(1.0)
    }
}

/// Individual sub-scores, each in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub recency: f32,
    pub category: f32,
    pub length: f32,
    pub significance: f32,
}

impl ScoreBreakdown {
    /// Weighted combination, clamped to `[0, 1]`
    pub fn combine(&self, weights: &ScoringWeights) -> f32 {
        let total = self.recency * weights.recency
            + self.category * weights.category
            + self.length * weights.length
            + self.significance * weights.significance;
        total.clamp(0.0, 1.0)
    }
}

/// Stateless importance scorer
#[derive(Clone)]
pub struct ImportanceScorer {
    config: ScoringConfig,
    classifier: Arc<dyn SignificanceClassifier>,
}

impl std::fmt::Debug for ImportanceScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportanceScorer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ImportanceScorer {
    /// Create a scorer using the configured trigger phrases
    pub fn new(config: ScoringConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let classifier = Arc::new(MarkerClassifier::new(&config.significance_markers));
        Ok(Self { config, classifier })
    }

    /// Replace the significance sub-score source
    pub fn with_classifier(mut self, classifier: Arc<dyn SignificanceClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Sub-scores for a memory at time `now`
    pub fn breakdown(&self, item: &MemoryItem, now: DateTime<Utc>) -> ScoreBreakdown {
        let age_hours = (now - item.created_at).num_milliseconds() as f64 / 3_600_000.0;
        ScoreBreakdown {
            recency: recency_score(age_hours, self.config.half_life_hours),
            category: category_score(item.category),
            length: length_score(item.content.chars().count(), self.config.length_saturation_chars),
            significance: self.classifier.significance(item).clamp(0.0, 1.0),
        }
    }

    /// Importance of a memory at time `now`, in `[0, 1]`
    pub fn score(&self, item: &MemoryItem, now: DateTime<Utc>) -> f32 {
        self.breakdown(item, now).combine(&self.config.weights)
    }

    /// Score every item, preserving input order
    pub fn score_all(&self, items: &[MemoryItem], now: DateTime<Utc>) -> Vec<ScoredMemory> {
        items
            .iter()
            .map(|item| ScoredMemory::new(item.clone(), self.score(item, now)))
            .collect()
    }
}

/// Exponential decay: 1.0 at age 0, 0.5 at one half-life.
///
/// Negative ages (clock skew, future timestamps) count as age 0.
pub fn recency_score(age_hours: f64, half_life_hours: f64) -> f32 {
    let age = age_hours.max(0.0);
    (-std::f64::consts::LN_2 * age / half_life_hours).exp() as f32
}

pub fn category_score(category: MemoryCategory) -> f32 {
    category.base_weight()
}

/// `ln(1 + chars) / ln(1 + saturation)`, capped at 1.0
pub fn length_score(chars: usize, saturation_chars: usize) -> f32 {
    if saturation_chars == 0 {
        return 1.0;
    }
    let value = (1.0 + chars as f64).ln() / (1.0 + saturation_chars as f64).ln();
    value.min(1.0) as f32
}
