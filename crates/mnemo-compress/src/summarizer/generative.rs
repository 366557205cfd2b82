//! Generative summarizer
//!
//! Builds a prompt from the batch and delegates to a [`GenerativeBackend`].
//! The response is returned as-is apart from surrounding whitespace.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::backend::GenerativeBackend;
use crate::memory::tokens::{CharRatioEstimator, TokenEstimator};
use crate::memory::types::SummaryStrategy;
use crate::summarizer::Summarizer;
use crate::summarizer::prompts::{CONCISE_HINT, SUMMARIZE_PROMPT, TARGET_HINT};
use crate::summarizer::types::{CompressionBatch, SummarizeError, SummaryOutput};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Summarizer backed by a generative model
pub struct GenerativeSummarizer {
    backend: Arc<dyn GenerativeBackend>,
    request_timeout: Duration,
    estimator: Arc<dyn TokenEstimator>,
}

impl GenerativeSummarizer {
    pub fn new(backend: Arc<dyn GenerativeBackend>) -> Self {
        Self {
            backend,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            estimator: Arc::new(CharRatioEstimator::default()),
        }
    }

    /// Timeout passed down to the backend for each request
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Estimator used to turn a target ratio into a token hint
    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Render the prompt for a batch
    pub fn build_prompt(&self, batch: &CompressionBatch) -> String {
        let memories = batch
            .items
            .iter()
            .map(|s| {
                format!(
                    "[{}] ({}) {}",
                    s.item.created_at.format("%Y-%m-%d %H:%M"),
                    s.item.category,
                    s.item.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let length_hint = match batch.target_ratio {
            Some(ratio) => {
                let source_tokens = self.estimator.estimate(&batch.concatenated_content());
                let target = ((source_tokens as f64) * ratio as f64).ceil().max(1.0) as usize;
                TARGET_HINT.replace("{target_tokens}", &target.to_string())
            }
            None => CONCISE_HINT.to_string(),
        };

        SUMMARIZE_PROMPT
            .replace("{count}", &batch.len().to_string())
            .replace("{tier}", batch.tier.as_str())
            .replace("{length_hint}", &length_hint)
            .replace("{memories}", &memories)
    }
}

#[async_trait]
impl Summarizer for GenerativeSummarizer {
    async fn summarize(&self, batch: &CompressionBatch) -> Result<SummaryOutput, SummarizeError> {
        let prompt = self.build_prompt(batch);
        debug!(
            "Requesting {} summary of {} memories from {}",
            batch.tier,
            batch.len(),
            self.backend.name()
        );

        let text = self.backend.generate(&prompt, self.request_timeout).await?;
        if text.trim().is_empty() {
            return Err(SummarizeError::EmptyResponse);
        }

        Ok(SummaryOutput::new(text, SummaryStrategy::Generative))
    }

    fn strategy(&self) -> SummaryStrategy {
        SummaryStrategy::Generative
    }

    fn name(&self) -> &'static str {
        "generative"
    }
}
