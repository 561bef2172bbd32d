//! Write Batch
//!
//! Ordered put / delete / merge operations staged in memory and applied
//! atomically by [`Database::write`](crate::Database::write). Staging never
//! touches the engine; handles are checked when the batch is committed.

use std::fmt;

use crate::session::ColumnFamilyHandle;
use crate::wal::RecordKind;

/// One staged operation
#[derive(Clone)]
pub struct BatchEntry {
    kind: RecordKind,
    /// None = default column family
    column_family: Option<ColumnFamilyHandle>,
    key: Vec<u8>,
    /// Empty for deletes
    value: Vec<u8>,
}

impl BatchEntry {
    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn column_family(&self) -> Option<&ColumnFamilyHandle> {
        self.column_family.as_ref()
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

impl fmt::Debug for BatchEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchEntry")
            .field("kind", &self.kind)
            .field(
                "column_family",
                &self.column_family.as_ref().map(ColumnFamilyHandle::name),
            )
            .field("key", &self.key.escape_ascii().to_string())
            .field("value_len", &self.value.len())
            .finish()
    }
}

/// Staged writes, applied in insertion order
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    entries: Vec<BatchEntry>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    fn stage(
        &mut self,
        kind: RecordKind,
        column_family: Option<&ColumnFamilyHandle>,
        key: &[u8],
        value: &[u8],
    ) {
        self.entries.push(BatchEntry {
            kind,
            column_family: column_family.cloned(),
            key: key.to_vec(),
            value: value.to_vec(),
        });
    }

    pub fn put(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) {
        self.stage(RecordKind::Put, None, key.as_ref(), value.as_ref());
    }

    pub fn put_cf(
        &mut self,
        cf: &ColumnFamilyHandle,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) {
        self.stage(RecordKind::Put, Some(cf), key.as_ref(), value.as_ref());
    }

    pub fn delete(&mut self, key: impl AsRef<[u8]>) {
        self.stage(RecordKind::Delete, None, key.as_ref(), &[]);
    }

    pub fn delete_cf(&mut self, cf: &ColumnFamilyHandle, key: impl AsRef<[u8]>) {
        self.stage(RecordKind::Delete, Some(cf), key.as_ref(), &[]);
    }

    /// Stage a merge operand; the family needs a merge operator at commit
    pub fn merge(&mut self, key: impl AsRef<[u8]>, operand: impl AsRef<[u8]>) {
        self.stage(RecordKind::Merge, None, key.as_ref(), operand.as_ref());
    }

    pub fn merge_cf(
        &mut self,
        cf: &ColumnFamilyHandle,
        key: impl AsRef<[u8]>,
        operand: impl AsRef<[u8]>,
    ) {
        self.stage(RecordKind::Merge, Some(cf), key.as_ref(), operand.as_ref());
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BatchEntry> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a WriteBatch {
    type Item = &'a BatchEntry;
    type IntoIter = std::slice::Iter<'a, BatchEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
