//! Mnemo Compress - hierarchical memory compression for long-running agents
//!
//! This crate keeps an agent's working memory small: it scores raw memories,
//! routes them into Raw, Recent and Archive tiers, summarizes overflowing
//! tiers (generative model first, rule-based reduction as fallback), and
//! assembles token-bounded context blocks from live items and summaries.

pub mod backend;
pub mod compaction;
pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod stats;
pub mod storage;
pub mod summarizer;
pub mod testing;

pub use engine::CompressionEngine;
pub use error::{CompressError, Result};
