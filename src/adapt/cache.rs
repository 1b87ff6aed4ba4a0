use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::adapt::history::AdaptationAttempt;
use crate::element::element_model::InteractiveElement;

pub const DEFAULT_TTL_MS: u64 = 300_000;

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A cached element plus the adaptation attempts made on its behalf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementSnapshot {
    pub element: InteractiveElement,
    pub timestamp: u64,
    pub page_url: String,
    #[serde(default)]
    pub adaptation_history: Vec<AdaptationAttempt>,
}

/// Cache key: page url, type, selector and text.
pub fn cache_key(page_url: &str, element: &InteractiveElement) -> String {
    format!(
        "{}::{}::{}::{}",
        page_url,
        element.element_type,
        element.selector,
        element.text.as_deref().unwrap_or("")
    )
}

/// TTL-bounded element cache. One snapshot per key; the latest write wins.
#[derive(Debug, Clone)]
pub struct AdaptiveCache {
    entries: HashMap<String, ElementSnapshot>,
    ttl_ms: u64,
}

impl Default for AdaptiveCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL_MS)
    }
}

impl AdaptiveCache {
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            entries: HashMap::new(),
            ttl_ms,
        }
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    pub fn put(&mut self, page_url: &str, element: InteractiveElement) -> String {
        self.put_at(page_url, element, now_ms())
    }

    /// Store `element` stamped at `timestamp`. Any history already recorded
    /// under the same key carries over to the new snapshot.
    pub fn put_at(&mut self, page_url: &str, element: InteractiveElement, timestamp: u64) -> String {
        let key = cache_key(page_url, &element);
        let adaptation_history = self
            .entries
            .remove(&key)
            .map(|old| old.adaptation_history)
            .unwrap_or_default();

        self.entries.insert(
            key.clone(),
            ElementSnapshot {
                element,
                timestamp,
                page_url: page_url.to_string(),
                adaptation_history,
            },
        );
        key
    }

    pub fn get(&self, key: &str) -> Option<&ElementSnapshot> {
        self.entries.get(key)
    }

    /// Like `get`, but expired snapshots read as absent.
    pub fn get_valid(&self, key: &str) -> Option<&ElementSnapshot> {
        self.get(key).filter(|s| self.is_valid(s))
    }

    pub fn is_valid(&self, snapshot: &ElementSnapshot) -> bool {
        self.is_valid_at(snapshot, now_ms())
    }

    pub fn is_valid_at(&self, snapshot: &ElementSnapshot, now: u64) -> bool {
        now.saturating_sub(snapshot.timestamp) < self.ttl_ms
    }

    /// Newest valid snapshot on `page_url` that was adapted from `selector`.
    pub fn find_adapted(&self, page_url: &str, selector: &str) -> Option<&ElementSnapshot> {
        let now = now_ms();
        self.entries
            .values()
            .filter(|s| s.page_url == page_url)
            .filter(|s| s.element.metadata.adapted_from.as_deref() == Some(selector))
            .filter(|s| self.is_valid_at(s, now))
            .max_by_key(|s| s.timestamp)
    }

    /// Append to a snapshot's history. Returns `false` if `key` is not cached.
    pub fn record_attempt(&mut self, key: &str, attempt: AdaptationAttempt) -> bool {
        match self.entries.get_mut(key) {
            Some(snapshot) => {
                snapshot.adaptation_history.push(attempt);
                true
            }
            None => false,
        }
    }

    /// Drop every expired snapshot, returning how many went.
    pub fn purge_expired(&mut self) -> usize {
        let now = now_ms();
        let ttl = self.ttl_ms;
        let before = self.entries.len();
        self.entries
            .retain(|_, s| now.saturating_sub(s.timestamp) < ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
