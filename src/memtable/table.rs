//! MemTable implementation
//!
//! Copy-on-write BTreeMap keyed by raw bytes.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;

use crate::config::MergeOperator;

/// Immutable view of a table at one point in time
pub type Snapshot = Arc<BTreeMap<Bytes, Bytes>>;

/// In-memory table for one column family
#[derive(Debug, Default)]
pub struct MemTable {
    entries: Snapshot,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value by key
    pub fn get(&self, key: &[u8]) -> Option<&Bytes> {
        self.entries.get(key)
    }

    /// Put a key-value pair
    pub fn put(&mut self, key: Bytes, value: Bytes) {
        Arc::make_mut(&mut self.entries).insert(key, value);
    }

    /// Remove a key
    pub fn delete(&mut self, key: &[u8]) {
        // Avoid copying a shared map when there is nothing to remove
        if self.entries.contains_key(key) {
            Arc::make_mut(&mut self.entries).remove(key);
        }
    }

    /// Fold a merge operand into the current value
    pub fn merge(&mut self, key: Bytes, operand: &[u8], operator: MergeOperator) {
        let merged = operator.merge(self.get(&key).map(|v| v.as_ref()), operand);
        self.put(key, Bytes::from(merged));
    }

    /// Point-in-time view for a cursor
    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.entries)
    }
}
