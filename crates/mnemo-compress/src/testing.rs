//! Test utilities for mnemo-compress - scripted backends and fixtures
//!
//! This module provides mocks for fast, deterministic tests:
//! - A scripted generative backend with configurable failure modes
//! - Memory and batch fixtures with evenly spaced timestamps

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::backend::{BackendError, GenerativeBackend};
use crate::memory::types::{MemoryCategory, MemoryItem, ScoredMemory, Tier};
use crate::summarizer::CompressionBatch;

/// How a [`ScriptedBackend`] answers
#[derive(Debug, Clone)]
pub enum Script {
    /// Always return this text
    Reply(String),
    /// Always fail with an API error
    Fail,
    /// Sleep this long before replying
    Hang(Duration),
    /// Return whitespace only
    Empty,
    /// Return the number of memory lines in the prompt
    Echo,
}

/// Mock generative backend for deterministic tests without real LLM calls
#[derive(Debug)]
pub struct ScriptedBackend {
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn reply(text: &str) -> Self {
        Self::new(Script::Reply(text.to_string()))
    }

    pub fn failing() -> Self {
        Self::new(Script::Fail)
    }

    pub fn hanging(delay: Duration) -> Self {
        Self::new(Script::Hang(delay))
    }

    pub fn empty() -> Self {
        Self::new(Script::Empty)
    }

    pub fn echo() -> Self {
        Self::new(Script::Echo)
    }

    /// Number of `generate` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerativeBackend for ScriptedBackend {
    async fn generate(&self, prompt: &str, _timeout: Duration) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Reply(text) => Ok(text.clone()),
            Script::Fail => Err(BackendError::Api("scripted failure".into())),
            Script::Hang(delay) => {
                tokio::time::sleep(*delay).await;
                Ok("too late".to_string())
            }
            Script::Empty => Ok("   ".to_string()),
            Script::Echo => {
                let lines = prompt.lines().filter(|l| l.starts_with('[')).count();
                Ok(format!("summary of {lines} memories"))
            }
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// `n` memories one minute apart ending at `newest`, returned oldest-first.
///
/// Content is long enough that summaries actually shrink it.
pub fn memories_ending_at(n: usize, newest: DateTime<Utc>) -> Vec<MemoryItem> {
    (0..n)
        .map(|i| {
            let age = (n - 1 - i) as i64;
            MemoryItem::at(
                format!(
                    "Memory {i}: the agent inspected the deployment logs, compared the error \
                     rates against the previous release and noted the results for follow-up"
                ),
                category_for(i),
                newest - ChronoDuration::minutes(age),
            )
        })
        .collect()
}

/// `n` memories one minute apart ending now, oldest-first
pub fn memories(n: usize) -> Vec<MemoryItem> {
    memories_ending_at(n, Utc::now())
}

/// A batch of `n` scored memories from `tier`, oldest-first
pub fn scored_batch(tier: Tier, n: usize) -> CompressionBatch {
    let items = memories(n)
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let mut scored = ScoredMemory::new(item, 0.5 + (i % 5) as f32 * 0.1);
            scored.tier = tier;
            scored
        })
        .collect();
    CompressionBatch::new(tier, items)
}

fn category_for(i: usize) -> MemoryCategory {
    match i % 4 {
        0 => MemoryCategory::Observation,
        1 => MemoryCategory::Task,
        2 => MemoryCategory::Decision,
        _ => MemoryCategory::Observation,
    }
}
