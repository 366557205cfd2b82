//! Compression engine
//!
//! The public entry point. Wires a [`MemoryCompressor`] to a [`MemoryStore`],
//! persists summaries batch by batch, and keeps the live working set and run
//! statistics between calls. Runs are serialized: a second `compress` call
//! waits for the first to finish.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::backend::RemoteBackend;
use crate::compaction::{CompressionRunResult, MemoryCompressor};
use crate::config::{CompressionConfig, EngineConfig};
use crate::error::Result;
use crate::memory::context::{AssembledContext, ContextBudgetAssembler, ContextSources};
use crate::memory::scoring::ImportanceScorer;
use crate::memory::types::{MemoryItem, ScoredMemory};
use crate::stats::{CompressionStatsTracker, StatsSnapshot};
use crate::storage::{MemoryStore, RawMemoryFilter};
use crate::summarizer::GenerativeSummarizer;

/// How many stored summaries are consulted for coverage and context
const DEFAULT_SUMMARY_LIMIT: usize = 10_000;

pub struct CompressionEngine {
    compressor: MemoryCompressor,
    store: Arc<dyn MemoryStore>,
    assembler: ContextBudgetAssembler,
    run_lock: Mutex<()>,
    working_set: RwLock<Vec<ScoredMemory>>,
    stats: RwLock<CompressionStatsTracker>,
    summary_limit: usize,
}

impl CompressionEngine {
    pub fn new(compressor: MemoryCompressor, store: Arc<dyn MemoryStore>) -> Self {
        let assembler = ContextBudgetAssembler::new(compressor.estimator().clone());
        Self {
            compressor,
            store,
            assembler,
            run_lock: Mutex::new(()),
            working_set: RwLock::new(Vec::new()),
            stats: RwLock::new(CompressionStatsTracker::new()),
            summary_limit: DEFAULT_SUMMARY_LIMIT,
        }
    }

    /// Build an engine from configuration.
    ///
    /// When the backend is enabled, the remote model becomes the primary
    /// summarizer and the rule-based one is kept as fallback.
    pub fn from_config(config: &EngineConfig, store: Arc<dyn MemoryStore>) -> Result<Self> {
        config.validate()?;
        let scorer = ImportanceScorer::new(config.scoring.clone())?;
        let mut compressor = MemoryCompressor::new(scorer);

        if config.backend.enabled {
            let backend = RemoteBackend::new(&config.backend)?;
            info!(
                "Using {} at {} for summaries",
                config.backend.model, config.backend.api_url
            );
            let request_timeout = Duration::from_millis(config.compression.generative_timeout_ms);
            let generative =
                GenerativeSummarizer::new(Arc::new(backend)).with_request_timeout(request_timeout);
            compressor = compressor.with_primary(Arc::new(generative));
        }

        Ok(Self::new(compressor, store))
    }

    /// Limit on stored summaries read per query
    pub fn with_summary_limit(mut self, limit: usize) -> Self {
        self.summary_limit = limit;
        self
    }

    pub fn compressor(&self) -> &MemoryCompressor {
        &self.compressor
    }

    /// Run one compression pass over `raw`.
    ///
    /// Every memory is tiered. Those already covered by a stored summary keep
    /// their place in the tiers but are not summarized again. Each new summary
    /// is written to the store as its batch completes.
    pub async fn compress(
        &self,
        raw: &[MemoryItem],
        config: &CompressionConfig,
    ) -> Result<CompressionRunResult> {
        let _guard = self.run_lock.lock().await;
        config.validate()?;

        let covered = self.covered_ids().await?;
        let already = raw.iter().filter(|m| covered.contains(&m.id)).count();
        if already > 0 {
            debug!("{} memories already summarized", already);
        }

        let sink = self.store.clone();
        let result = self
            .compressor
            .compress_with_sink(raw, config, Utc::now(), &covered, Some(&sink))
            .await?;

        *self.working_set.write().await = result.live_items().cloned().collect();
        self.stats.write().await.record(&result);

        Ok(result)
    }

    /// Read raw memories from the store and compress them
    pub async fn compress_from_store(
        &self,
        filter: &RawMemoryFilter,
        config: &CompressionConfig,
    ) -> Result<CompressionRunResult> {
        let raw = self.store.query_raw_memories(filter).await?;
        debug!("Loaded {} raw memories from store", raw.len());
        self.compress(&raw, config).await
    }

    /// Blend the live working set with stored summaries within `token_budget`
    pub async fn get_context(&self, token_budget: usize) -> Result<AssembledContext> {
        let live = self.working_set.read().await.clone();
        let summaries = self.store.query_summaries(None, self.summary_limit).await?;
        let sources = ContextSources::from_parts(&live, &summaries);
        Ok(self.assembler.assemble(&sources, token_budget))
    }

    pub async fn get_stats(&self) -> StatsSnapshot {
        self.stats.read().await.latest()
    }

    /// Memories left uncompressed by the last run, newest-first
    pub async fn working_set(&self) -> Vec<ScoredMemory> {
        self.working_set.read().await.clone()
    }

    async fn covered_ids(&self) -> Result<HashSet<Uuid>> {
        let summaries = self.store.query_summaries(None, self.summary_limit).await?;
        Ok(summaries
            .into_iter()
            .flat_map(|s| s.source_ids.into_iter())
            .collect())
    }
}

impl std::fmt::Debug for CompressionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressionEngine")
            .field("compressor", &self.compressor)
            .field("summary_limit", &self.summary_limit)
            .finish_non_exhaustive()
    }
}
