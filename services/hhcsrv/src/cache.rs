//! Value cache
//!
//! Latest decoded value per point key. Entries are replaced whole, never edited in
//! place, and a key only exists once its point has been decoded (or written) at
//! least once.

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::time::Instant;

use crate::codec::DecodedValue;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: DecodedValue,
    pub updated_at: Instant,
}

#[derive(Debug, Default)]
pub struct ValueCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ValueCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value for `key`; `Unavailable` when the point was never decoded
    pub fn get(&self, key: &str) -> DecodedValue {
        self.entries
            .read()
            .get(key)
            .map(|e| e.value.clone())
            .unwrap_or(DecodedValue::Unavailable)
    }

    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.entries.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Copy of every cached value
    pub fn snapshot(&self) -> HashMap<String, DecodedValue> {
        self.entries
            .read()
            .iter()
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    pub fn replace(&self, key: &str, value: DecodedValue) {
        let entry = CacheEntry {
            value,
            updated_at: Instant::now(),
        };
        self.entries.write().insert(key.to_string(), entry);
    }

    /// Replace several entries under one lock acquisition
    pub fn replace_many(&self, values: impl IntoIterator<Item = (String, DecodedValue)>) {
        let now = Instant::now();
        let mut entries = self.entries.write();
        for (key, value) in values {
            entries.insert(
                key,
                CacheEntry {
                    value,
                    updated_at: now,
                },
            );
        }
    }

    /// Mark every cached value `Unavailable`; returns how many entries changed.
    pub fn invalidate_all(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let mut changed = 0;
        for entry in entries.values_mut() {
            if entry.value != DecodedValue::Unavailable {
                *entry = CacheEntry {
                    value: DecodedValue::Unavailable,
                    updated_at: now,
                };
                changed += 1;
            }
        }
        changed
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
