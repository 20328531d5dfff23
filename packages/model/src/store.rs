//! Hash-keyed store of immutable values (annotations)
//!
//! Keys are derived from the value itself: `h` followed by the CRC32 of the
//! value's canonical JSON. Storing the same value twice yields the same key.

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueStore {
    values: BTreeMap<String, Value>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key under which `value` is stored
    pub fn hash_of(value: &Value) -> String {
        // serde_json keeps object keys sorted, so this text is canonical
        let canonical = value.to_string();
        let mut hasher = Hasher::new();
        hasher.update(canonical.as_bytes());
        format!("h{:08x}", hasher.finalize())
    }

    pub fn insert(&mut self, value: Value) -> String {
        let hash = Self::hash_of(&value);
        self.values.entry(hash.clone()).or_insert(value);
        hash
    }

    pub fn get(&self, hash: &str) -> Option<&Value> {
        self.values.get(hash)
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.values.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn hashes(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Add every entry of `other` not already present
    pub fn merge(&mut self, other: &ValueStore) {
        for (hash, value) in &other.values {
            self.values
                .entry(hash.clone())
                .or_insert_with(|| value.clone());
        }
    }

    /// Entries of `self` whose keys are absent from `other`
    pub fn difference(&self, other: &ValueStore) -> ValueStore {
        ValueStore {
            values: self
                .values
                .iter()
                .filter(|(hash, _)| !other.contains(hash))
                .map(|(hash, value)| (hash.clone(), value.clone()))
                .collect(),
        }
    }
}
