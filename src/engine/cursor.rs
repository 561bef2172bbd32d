//! Snapshot Cursor
//!
//! Bidirectional cursor over a memtable snapshot.

use std::ops::Bound;

use bytes::Bytes;

use crate::error::EngineResult;
use crate::memtable::Snapshot;

use super::EngineCursor;

/// Cursor over a frozen view of one column family
///
/// The snapshot is reference counted, so the cursor stays readable after the
/// family is dropped or written to.
pub struct SnapshotCursor {
    entries: Snapshot,
    /// Current (key, value); None = not positioned
    current: Option<(Bytes, Bytes)>,
}

impl SnapshotCursor {
    pub fn new(entries: Snapshot) -> Self {
        Self {
            entries,
            current: None,
        }
    }

    fn position<'a>(&mut self, entry: Option<(&'a Bytes, &'a Bytes)>) {
        self.current = entry.map(|(k, v)| (k.clone(), v.clone()));
    }
}

impl EngineCursor for SnapshotCursor {
    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn seek_to_first(&mut self) {
        let entries = self.entries.clone();
        self.position(entries.iter().next());
    }

    fn seek_to_last(&mut self) {
        let entries = self.entries.clone();
        self.position(entries.iter().next_back());
    }

    fn seek(&mut self, target: &[u8]) {
        let entries = self.entries.clone();
        self.position(
            entries
                .range::<[u8], _>((Bound::Included(target), Bound::Unbounded))
                .next(),
        );
    }

    fn seek_for_prev(&mut self, target: &[u8]) {
        let entries = self.entries.clone();
        self.position(
            entries
                .range::<[u8], _>((Bound::Unbounded, Bound::Included(target)))
                .next_back(),
        );
    }

    fn next(&mut self) {
        let Some((key, _)) = self.current.take() else {
            return;
        };
        let entries = self.entries.clone();
        self.position(
            entries
                .range::<[u8], _>((Bound::Excluded(key.as_ref()), Bound::Unbounded))
                .next(),
        );
    }

    fn prev(&mut self) {
        let Some((key, _)) = self.current.take() else {
            return;
        };
        let entries = self.entries.clone();
        self.position(
            entries
                .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(key.as_ref())))
                .next_back(),
        );
    }

    fn key(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(k, _)| k.as_ref())
    }

    fn value(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(_, v)| v.as_ref())
    }

    fn status(&self) -> EngineResult<()> {
        Ok(())
    }
}
