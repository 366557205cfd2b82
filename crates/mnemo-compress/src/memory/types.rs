//! Memory types for the compression engine
//!
//! Defines the raw memory records produced by an agent, their scored and
//! tiered form, and the durable summaries that replace them.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single raw memory record emitted by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Unique identifier for this memory
    pub id: Uuid,
    /// The actual content of the memory
    pub content: String,
    /// What kind of record this is
    pub category: MemoryCategory,
    /// When this memory was created
    pub created_at: DateTime<Utc>,
    /// Computed importance, `None` until scored
    #[serde(default)]
    pub importance: Option<f32>,
}

impl MemoryItem {
    /// Create a new memory stamped with the current time
    pub fn new(content: impl Into<String>, category: MemoryCategory) -> Self {
        Self::at(content, category, Utc::now())
    }

    /// Create a new memory with an explicit creation time
    pub fn at(
        content: impl Into<String>,
        category: MemoryCategory,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            category,
            created_at,
            importance: None,
        }
    }

    /// Return a copy carrying the given importance score
    pub(crate) fn with_importance(&self, importance: f32) -> Self {
        Self {
            importance: Some(importance),
            ..self.clone()
        }
    }
}

/// Category of a memory record.
///
/// Unrecognized labels deserialize to [`MemoryCategory::Unknown`] rather than failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    /// A choice the agent made
    Decision,
    /// A stated user preference
    Preference,
    /// Something that went wrong
    Mistake,
    /// An explicit takeaway
    Lesson,
    /// Something the agent noticed
    Observation,
    /// Routine task progress
    Task,
    /// Anything else
    #[serde(other)]
    Unknown,
}

impl MemoryCategory {
    /// Base importance of this category, in `[0, 1]`
    pub fn base_weight(self) -> f32 {
        match self {
            MemoryCategory::Decision => 1.0,
            MemoryCategory::Preference => 0.9,
            MemoryCategory::Mistake => 0.9,
            MemoryCategory::Lesson => 0.85,
            MemoryCategory::Observation => 0.5,
            MemoryCategory::Task => 0.2,
            MemoryCategory::Unknown => 0.2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MemoryCategory::Decision => "decision",
            MemoryCategory::Preference => "preference",
            MemoryCategory::Mistake => "mistake",
            MemoryCategory::Lesson => "lesson",
            MemoryCategory::Observation => "observation",
            MemoryCategory::Task => "task",
            MemoryCategory::Unknown => "unknown",
        }
    }
}

impl From<&str> for MemoryCategory {
    fn from(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "decision" => MemoryCategory::Decision,
            "preference" => MemoryCategory::Preference,
            "mistake" | "error" => MemoryCategory::Mistake,
            "lesson" => MemoryCategory::Lesson,
            "observation" => MemoryCategory::Observation,
            "task" => MemoryCategory::Task,
            _ => MemoryCategory::Unknown,
        }
    }
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retention tier, in order of decreasing fidelity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Newest items, kept verbatim
    Raw,
    /// Overflow from raw, partially summarized
    Recent,
    /// Everything beyond both capacities, summarized aggressively
    Archive,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Raw, Tier::Recent, Tier::Archive];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Raw => "raw",
            Tier::Recent => "recent",
            Tier::Archive => "archive",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A memory with its importance score and tier assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMemory {
    pub item: MemoryItem,
    /// Importance in `[0, 1]`
    pub score: f32,
    pub tier: Tier,
    /// Whether the item was folded into a summary during the run
    #[serde(default)]
    pub compressed: bool,
}

impl ScoredMemory {
    pub fn new(item: MemoryItem, score: f32) -> Self {
        let score = score.clamp(0.0, 1.0);
        Self {
            item: item.with_importance(score),
            score,
            tier: Tier::Raw,
            compressed: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.item.id
    }
}

/// Which summarization path produced a summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStrategy {
    /// Produced by the generative model backend
    Generative,
    /// Produced by the deterministic rule-based reducer
    Fallback,
}

impl fmt::Display for SummaryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummaryStrategy::Generative => f.write_str("generative"),
            SummaryStrategy::Fallback => f.write_str("fallback"),
        }
    }
}

/// A durable, write-once summary covering a set of memories from one tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub id: Uuid,
    pub source_tier: Tier,
    /// Memories this summary supersedes
    pub source_ids: BTreeSet<Uuid>,
    pub text: String,
    pub strategy_used: SummaryStrategy,
    pub created_at: DateTime<Utc>,
    pub token_count_estimate: usize,
    /// Creation time of the oldest covered memory
    pub covers_from: DateTime<Utc>,
    /// Creation time of the newest covered memory
    pub covers_to: DateTime<Utc>,
}

impl Summary {
    /// True when this summary shares at least one source memory with `other`
    pub fn overlaps(&self, other: &Summary) -> bool {
        !self.source_ids.is_disjoint(&other.source_ids)
    }
}
