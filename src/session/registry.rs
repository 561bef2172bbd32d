//! Handle Registry
//!
//! Per-session bookkeeping of every live column-family handle and every live
//! iterator cursor, plus the session lifecycle they are checked against.
//!
//! ## Ownership
//! ```text
//!   HandleRegistry ──Arc──► FamilyState ◄──Arc── ColumnFamilyHandle
//!        │                       │
//!        │                       └──Weak──► HandleRegistry
//!        │
//!        └──Arc──► CursorSlot (Mutex<Option<cursor>>) ◄──Arc── DbIterator
//! ```
//!
//! A cursor is disposed by taking it out of its slot. Both the session's
//! teardown and the lease's own drop do this under the slot mutex, so
//! whichever runs first frees the cursor and the other finds `None`.
//!
//! ## Lock order
//! engine lock → registry mutex → cursor slot. Nothing takes the registry
//! mutex while holding a slot.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crossbeam::atomic::AtomicCell;
use parking_lot::Mutex;

use crate::engine::{EngineCursor, FamilyId};
use crate::error::{Result, StorageError};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Open,
    /// A close won the transition and is tearing down
    Closing,
    Closed,
}

pub(crate) type CursorId = u64;

/// Exclusive home of one engine cursor
pub(crate) type CursorSlot = Arc<Mutex<Option<Box<dyn EngineCursor>>>>;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

// =============================================================================
// Family State
// =============================================================================

/// Shared state behind every clone of one column-family handle
pub(crate) struct FamilyState {
    name: String,
    id: FamilyId,
    session_id: u64,
    valid: AtomicBool,
    registry: Weak<HandleRegistry>,
}

impl FamilyState {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn id(&self) -> FamilyId {
        self.id
    }

    pub(crate) fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Not dropped (ignores session state)
    pub(crate) fn is_registered(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Not dropped and the owning session is still open
    pub(crate) fn is_valid(&self) -> bool {
        self.is_registered()
            && self
                .registry
                .upgrade()
                .is_some_and(|registry| registry.is_open())
    }

    fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

impl fmt::Debug for FamilyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FamilyState")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("session_id", &self.session_id)
            .field("valid", &self.is_registered())
            .finish()
    }
}

// =============================================================================
// Registry
// =============================================================================

/// What a session teardown released
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct TeardownReport {
    pub cursors_disposed: usize,
    pub handles_invalidated: usize,
}

#[derive(Default)]
struct RegistryInner {
    families: BTreeMap<String, Arc<FamilyState>>,
    cursors: HashMap<CursorId, CursorSlot>,
}

/// Live handles and cursors of one session
///
/// The family map and the cursor map share one mutex; every insert, removal
/// and lookup is a single critical section.
pub(crate) struct HandleRegistry {
    session_id: u64,
    lifecycle: AtomicCell<Lifecycle>,
    inner: Mutex<RegistryInner>,
    next_cursor_id: AtomicU64,
}

impl HandleRegistry {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            session_id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            lifecycle: AtomicCell::new(Lifecycle::Open),
            inner: Mutex::new(RegistryInner::default()),
            next_cursor_id: AtomicU64::new(1),
        })
    }

    pub(crate) fn session_id(&self) -> u64 {
        self.session_id
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    pub(crate) fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.load()
    }

    pub(crate) fn is_open(&self) -> bool {
        self.lifecycle.load() == Lifecycle::Open
    }

    /// Open → Closing; true for exactly one caller
    pub(crate) fn begin_close(&self) -> bool {
        self.lifecycle
            .compare_exchange(Lifecycle::Open, Lifecycle::Closing)
            .is_ok()
    }

    pub(crate) fn finish_close(&self) {
        self.lifecycle.store(Lifecycle::Closed);
    }

    /// Dispose every cursor, then invalidate every handle
    pub(crate) fn teardown(&self) -> TeardownReport {
        let mut inner = self.inner.lock();
        let mut report = TeardownReport::default();

        for (_, slot) in inner.cursors.drain() {
            if slot.lock().take().is_some() {
                report.cursors_disposed += 1;
            }
        }

        for (_, state) in std::mem::take(&mut inner.families) {
            state.invalidate();
            report.handles_invalidated += 1;
        }

        report
    }

    // -------------------------------------------------------------------------
    // Column Families
    // -------------------------------------------------------------------------

    /// Track a new valid handle
    pub(crate) fn register_family(
        self: &Arc<Self>,
        name: &str,
        id: FamilyId,
    ) -> Result<Arc<FamilyState>> {
        let mut inner = self.inner.lock();
        if !self.is_open() {
            return Err(StorageError::Closed);
        }
        if inner.families.contains_key(name) {
            return Err(StorageError::AlreadyExists {
                name: name.to_string(),
            });
        }

        let state = Arc::new(FamilyState {
            name: name.to_string(),
            id,
            session_id: self.session_id,
            valid: AtomicBool::new(true),
            registry: Arc::downgrade(self),
        });
        inner.families.insert(name.to_string(), Arc::clone(&state));
        Ok(state)
    }

    /// Remove and invalidate `state`; false if it is no longer tracked
    pub(crate) fn unregister_family(&self, state: &Arc<FamilyState>) -> bool {
        let mut inner = self.inner.lock();
        match inner.families.get(state.name()) {
            Some(current) if Arc::ptr_eq(current, state) => {
                inner.families.remove(state.name());
                state.invalidate();
                true
            }
            _ => false,
        }
    }

    /// Put back a handle whose engine-level drop failed
    pub(crate) fn restore_family(&self, state: Arc<FamilyState>) {
        let mut inner = self.inner.lock();
        state.valid.store(true, Ordering::Release);
        inner.families.insert(state.name().to_string(), state);
    }

    pub(crate) fn family(&self, name: &str) -> Option<Arc<FamilyState>> {
        self.inner.lock().families.get(name).cloned()
    }

    pub(crate) fn contains_family(&self, name: &str) -> bool {
        self.inner.lock().families.contains_key(name)
    }

    /// Names of tracked handles, sorted
    pub(crate) fn family_names(&self) -> Vec<String> {
        self.inner.lock().families.keys().cloned().collect()
    }

    // -------------------------------------------------------------------------
    // Cursors
    // -------------------------------------------------------------------------

    /// Give a cursor a slot; refused once the session has started closing
    pub(crate) fn register_cursor(
        &self,
        cursor: Box<dyn EngineCursor>,
    ) -> Result<(CursorId, CursorSlot)> {
        let mut inner = self.inner.lock();
        if !self.is_open() {
            return Err(StorageError::Closed);
        }

        let id = self.next_cursor_id.fetch_add(1, Ordering::Relaxed);
        let slot: CursorSlot = Arc::new(Mutex::new(Some(cursor)));
        inner.cursors.insert(id, Arc::clone(&slot));
        Ok((id, slot))
    }

    /// Forget a cursor; the caller disposes of the slot contents
    pub(crate) fn release_cursor(&self, id: CursorId) -> Option<CursorSlot> {
        self.inner.lock().cursors.remove(&id)
    }

    pub(crate) fn live_cursor_count(&self) -> usize {
        self.inner.lock().cursors.len()
    }
}
