//! Iterator Lease
//!
//! A cursor over one column family, checked against its session on every
//! call. The cursor itself lives in a registry slot so that closing the
//! session can dispose of it while the lease is still held.

use std::fmt;
use std::sync::Weak;

use crate::engine::EngineCursor;
use crate::error::{Result, StorageError};

use super::registry::{CursorId, CursorSlot, HandleRegistry};
use super::ColumnFamilyHandle;

/// Iterator over a point-in-time view of one column family
///
/// ```text
/// created ──seek*──► positioned (valid | exhausted) ──drop──► disposed
/// ```
///
/// Every method fails with [`StorageError::Closed`] once the session has
/// started closing.
pub struct DbIterator {
    id: CursorId,
    slot: CursorSlot,
    registry: Weak<HandleRegistry>,
    column_family: ColumnFamilyHandle,
}

impl DbIterator {
    pub(crate) fn new(
        id: CursorId,
        slot: CursorSlot,
        registry: Weak<HandleRegistry>,
        column_family: ColumnFamilyHandle,
    ) -> Self {
        Self {
            id,
            slot,
            registry,
            column_family,
        }
    }

    fn with_cursor<R>(&self, f: impl FnOnce(&mut dyn EngineCursor) -> R) -> Result<R> {
        let mut slot = self.slot.lock();
        let open = self
            .registry
            .upgrade()
            .is_some_and(|registry| registry.is_open());
        if !open {
            return Err(StorageError::Closed);
        }
        match slot.as_mut() {
            Some(cursor) => Ok(f(cursor.as_mut())),
            None => Err(StorageError::Closed),
        }
    }

    pub fn valid(&self) -> Result<bool> {
        self.with_cursor(|cursor| cursor.valid())
    }

    pub fn seek_to_first(&mut self) -> Result<()> {
        self.with_cursor(|cursor| cursor.seek_to_first())
    }

    pub fn seek_to_last(&mut self) -> Result<()> {
        self.with_cursor(|cursor| cursor.seek_to_last())
    }

    /// Position at the first key at or after `key`
    pub fn seek(&mut self, key: impl AsRef<[u8]>) -> Result<()> {
        self.with_cursor(|cursor| cursor.seek(key.as_ref()))
    }

    /// Position at the last key at or before `key`
    pub fn seek_for_prev(&mut self, key: impl AsRef<[u8]>) -> Result<()> {
        self.with_cursor(|cursor| cursor.seek_for_prev(key.as_ref()))
    }

    pub fn next(&mut self) -> Result<()> {
        self.with_cursor(|cursor| cursor.next())
    }

    pub fn prev(&mut self) -> Result<()> {
        self.with_cursor(|cursor| cursor.prev())
    }

    /// Current key; None when not positioned
    pub fn key(&self) -> Result<Option<Vec<u8>>> {
        self.with_cursor(|cursor| cursor.key().map(<[u8]>::to_vec))
    }

    /// Current value; None when not positioned
    pub fn value(&self) -> Result<Option<Vec<u8>>> {
        self.with_cursor(|cursor| cursor.value().map(<[u8]>::to_vec))
    }

    /// Surface any fault the cursor met while moving
    pub fn check_status(&self) -> Result<()> {
        self.with_cursor(|cursor| cursor.status())?
            .map_err(StorageError::Iterator)
    }

    pub fn column_family(&self) -> &ColumnFamilyHandle {
        &self.column_family
    }
}

impl fmt::Debug for DbIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbIterator")
            .field("id", &self.id)
            .field("column_family", &self.column_family.name())
            .finish()
    }
}

impl Drop for DbIterator {
    fn drop(&mut self) {
        // Leave the live set first, then free the cursor unless close already did
        if let Some(registry) = self.registry.upgrade() {
            registry.release_cursor(self.id);
        }
        let cursor = self.slot.lock().take();
        drop(cursor);
    }
}
