//! Per-service tool catalog cache.
//!
//! Staleness is advisory: entries are never evicted by age, callers ask
//! [`ToolCache::is_fresh`] to decide whether to refetch.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::types::Tool;

/// How long a fetched catalog counts as fresh.
pub const TOOL_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
struct CacheEntry {
    tools: Vec<Tool>,
    refreshed_at: Instant,
}

/// Tool catalogs keyed by service name.
#[derive(Debug, Clone)]
pub struct ToolCache {
    entries: HashMap<String, CacheEntry>,
    ttl: Duration,
}

impl ToolCache {
    pub fn new() -> Self {
        Self::with_ttl(TOOL_CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    /// Cached tools for a service, possibly stale, empty if never fetched.
    pub fn get(&self, name: &str) -> Vec<Tool> {
        self.entries
            .get(name)
            .map(|e| e.tools.clone())
            .unwrap_or_default()
    }

    /// Replace the cached catalog and reset its freshness clock.
    pub fn put(&mut self, name: &str, tools: Vec<Tool>) {
        self.entries.insert(
            name.to_string(),
            CacheEntry {
                tools,
                refreshed_at: Instant::now(),
            },
        );
    }

    pub fn is_fresh(&self, name: &str) -> bool {
        self.entries
            .get(name)
            .map(|e| e.refreshed_at.elapsed() < self.ttl)
            .unwrap_or(false)
    }

    /// Number of cached tools for a service.
    pub fn tool_count(&self, name: &str) -> usize {
        self.entries.get(name).map(|e| e.tools.len()).unwrap_or(0)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }
}

impl Default for ToolCache {
    fn default() -> Self {
        Self::new()
    }
}
