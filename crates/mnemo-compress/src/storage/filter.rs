//! Filter types for raw memory queries
//!
//! Narrows which raw memories a store returns for a compression run.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::memory::types::{MemoryCategory, MemoryItem};

/// Filter criteria for raw memory queries.
///
/// All fields are optional - when `None`, that filter is not applied.
/// Multiple filters are combined with AND logic.
#[derive(Debug, Clone, Default)]
pub struct RawMemoryFilter {
    /// Only these categories (OR logic within this filter)
    pub categories: Option<Vec<MemoryCategory>>,
    /// Only memories created at or after this time
    pub since: Option<DateTime<Utc>>,
    /// Only memories created before this time
    pub until: Option<DateTime<Utc>>,
    /// Skip these ids
    pub exclude_ids: HashSet<Uuid>,
    /// Keep at most this many, newest first
    pub limit: Option<usize>,
}

impl RawMemoryFilter {
    /// Create a new empty filter (no filtering applied)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_categories(mut self, categories: Vec<MemoryCategory>) -> Self {
        self.categories = Some(categories);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn excluding<I: IntoIterator<Item = Uuid>>(mut self, ids: I) -> Self {
        self.exclude_ids.extend(ids);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `item` passes every criterion except `limit`
    pub fn matches(&self, item: &MemoryItem) -> bool {
        if let Some(ref categories) = self.categories {
            if !categories.is_empty() && !categories.contains(&item.category) {
                return false;
            }
        }
        if self.since.is_some_and(|since| item.created_at < since) {
            return false;
        }
        if self.until.is_some_and(|until| item.created_at >= until) {
            return false;
        }
        !self.exclude_ids.contains(&item.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_empty_filter_matches_everything() {
        let item = MemoryItem::new("x", MemoryCategory::Unknown);
        assert!(RawMemoryFilter::new().matches(&item));
    }

    #[test]
    fn test_category_filter() {
        let filter = RawMemoryFilter::new().with_categories(vec![MemoryCategory::Decision]);
        assert!(filter.matches(&MemoryItem::new("x", MemoryCategory::Decision)));
        assert!(!filter.matches(&MemoryItem::new("x", MemoryCategory::Task)));

        let empty = RawMemoryFilter::new().with_categories(vec![]);
        assert!(empty.matches(&MemoryItem::new("x", MemoryCategory::Task)));
    }

    #[test]
    fn test_time_window() {
        let now = Utc::now();
        let filter = RawMemoryFilter::new()
            .since(now - Duration::hours(2))
            .until(now);

        let task = |text: &str, at| MemoryItem::at(text, MemoryCategory::Task, at);
        assert!(filter.matches(&task("in", now - Duration::hours(1))));
        assert!(!filter.matches(&task("old", now - Duration::hours(3))));
        assert!(!filter.matches(&task("edge", now)));
    }

    #[test]
    fn test_exclude_ids() {
        let item = MemoryItem::new("x", MemoryCategory::Task);
        let filter = RawMemoryFilter::new().excluding([item.id]);
        assert!(!filter.matches(&item));
    }
}
