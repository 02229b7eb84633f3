//! Working-URL cache.
//!
//! # Responsibilities
//! - Remember base URLs that answered a probe, most recent first
//! - Keep the list deduplicated and bounded
//! - Convert to and from the persisted JSON array
//!
//! # Design Decisions
//! - Re-inserting a known URL moves it to the front instead of appending
//! - Entries that fail normalization on load are dropped, not errors

use std::collections::VecDeque;

use crate::discovery::candidate::normalize_base_url;

/// Default number of remembered URLs.
pub const DEFAULT_CAPACITY: usize = 10;

/// Bounded, ordered, deduplicated list of working base URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingUrlCache {
    entries: VecDeque<String>,
    capacity: usize,
}

impl Default for WorkingUrlCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl WorkingUrlCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Rebuild a cache from its persisted JSON form.
    ///
    /// Order is preserved; duplicates after the first occurrence and entries
    /// beyond capacity are discarded.
    pub fn from_json(raw: &str, capacity: usize) -> Result<Self, serde_json::Error> {
        let urls: Vec<String> = serde_json::from_str(raw)?;
        let mut cache = Self::new(capacity);
        for url in urls {
            let Some(url) = normalize_base_url(&url) else {
                tracing::debug!(url = %url, "Dropping malformed cached URL");
                continue;
            };
            if cache.entries.len() < cache.capacity && !cache.contains(&url) {
                cache.entries.push_back(url);
            }
        }
        Ok(cache)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.entries).unwrap_or_else(|_| "[]".to_string())
    }

    /// Move `url` to the front, inserting it if absent.
    pub fn promote(&mut self, url: &str) {
        if let Some(pos) = self.entries.iter().position(|u| u == url) {
            if let Some(existing) = self.entries.remove(pos) {
                self.entries.push_front(existing);
            }
            return;
        }

        self.entries.push_front(url.to_string());
        self.entries.truncate(self.capacity);
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.iter().any(|u| u == url)
    }

    /// Entries, most recent first.
    pub fn urls(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
