use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::CacheConfig;
use crate::context::TranslationContext;
use crate::source::SourceType;
use crate::translate::TranslatedSegment;

/// Result of a completed job as stored in the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedTranslation {
    pub title: String,
    pub source_language: String,
    pub target_language: String,
    pub source_type: SourceType,
    pub context: TranslationContext,
    pub segments: Vec<TranslatedSegment>,
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub item_id: String,
    /// Drives TTL and eviction order
    pub created_at: Instant,
    /// Wall-clock time for display
    pub cached_at: DateTime<Utc>,
    pub payload: CachedTranslation,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() >= ttl
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub count: usize,
    pub in_progress_count: usize,
    pub max_size: usize,
    pub ttl_secs: u64,
    pub item_ids: Vec<String>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    in_progress: HashSet<String>,
}

/// Per-item result cache and in-flight registry behind one lock
pub struct ResultCache {
    state: Mutex<CacheState>,
    max_size: usize,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            max_size: max_size.max(1),
            ttl,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_size, config.ttl())
    }

    /// Live entry for `item_id`; an expired one is evicted
    pub fn get(&self, item_id: &str) -> Option<CacheEntry> {
        let mut state = self.state.lock();
        let expired = state.entries.get(item_id)?.is_expired(self.ttl);
        if expired {
            state.entries.remove(item_id);
            debug!("Cache entry expired: {}", item_id);
            return None;
        }
        state.entries.get(item_id).cloned()
    }

    pub fn set(&self, item_id: &str, payload: CachedTranslation) {
        let mut state = self.state.lock();

        if !state.entries.contains_key(item_id) && state.entries.len() >= self.max_size {
            let oldest = state
                .entries
                .values()
                .min_by_key(|entry| entry.created_at)
                .map(|entry| entry.item_id.clone());
            if let Some(oldest) = oldest {
                state.entries.remove(&oldest);
                info!("Cache full, evicted oldest entry: {}", oldest);
            }
        }

        state.entries.insert(
            item_id.to_string(),
            CacheEntry {
                item_id: item_id.to_string(),
                created_at: Instant::now(),
                cached_at: Utc::now(),
                payload,
            },
        );
    }

    pub fn remove(&self, item_id: &str) -> bool {
        self.state.lock().entries.remove(item_id).is_some()
    }

    /// Drop every entry and in-flight marker, returning the entry count
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let count = state.entries.len();
        state.entries.clear();
        state.in_progress.clear();
        count
    }

    pub fn is_in_progress(&self, item_id: &str) -> bool {
        self.state.lock().in_progress.contains(item_id)
    }

    pub fn set_in_progress(&self, item_id: &str, in_progress: bool) {
        let mut state = self.state.lock();
        if in_progress {
            state.in_progress.insert(item_id.to_string());
        } else {
            state.in_progress.remove(item_id);
        }
    }

    /// Mark `item_id` in flight unless it already is. Returns whether the
    /// caller now owns the marker.
    pub fn try_begin(&self, item_id: &str) -> bool {
        self.state.lock().in_progress.insert(item_id.to_string())
    }

    pub fn stats(&self) -> CacheStats {
        let mut state = self.state.lock();
        let ttl = self.ttl;
        state.entries.retain(|_, entry| !entry.is_expired(ttl));

        let mut item_ids: Vec<String> = state.entries.keys().cloned().collect();
        item_ids.sort();

        CacheStats {
            count: state.entries.len(),
            in_progress_count: state.in_progress.len(),
            max_size: self.max_size,
            ttl_secs: self.ttl.as_secs(),
            item_ids,
        }
    }
}
