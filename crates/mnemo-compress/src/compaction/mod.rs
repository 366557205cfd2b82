//! Compaction module
//!
//! Tier routing and the compression pass that turns overflowing tiers into
//! summaries.

pub mod compressor;
pub mod result;
pub mod tiers;

pub use compressor::{MemoryCompressor, SummarySink};
pub use result::{BatchError, BatchErrorKind, CompressionRunResult};
pub use tiers::{TierCapacities, TierPlan, TierPolicy, TierRatios, sort_newest_first};
