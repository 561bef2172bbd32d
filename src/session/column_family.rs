//! Column Family Manager
//!
//! Handles to column families and the per-session view that creates, finds,
//! lists and drops them.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::ColumnFamilyOptions;
use crate::engine::{FamilyId, StorageEngine, DEFAULT_COLUMN_FAMILY_NAME};
use crate::error::{describe, Result, StorageError};

use super::registry::FamilyState;
use super::Database;

/// Handle to one column family of one session
///
/// Clones share validity: dropping the family through any clone invalidates
/// all of them. A handle never keeps its session alive.
#[derive(Clone)]
pub struct ColumnFamilyHandle {
    state: Arc<FamilyState>,
}

impl ColumnFamilyHandle {
    pub(crate) fn new(state: Arc<FamilyState>) -> Self {
        Self { state }
    }

    pub fn name(&self) -> &str {
        self.state.name()
    }

    /// True while the family is not dropped and its session is open
    pub fn is_valid(&self) -> bool {
        self.state.is_valid()
    }

    pub(crate) fn id(&self) -> FamilyId {
        self.state.id()
    }

    pub(crate) fn state(&self) -> &Arc<FamilyState> {
        &self.state
    }

    /// Registered in the session identified by `session_id`
    pub(crate) fn is_usable_in(&self, session_id: u64) -> bool {
        self.state.session_id() == session_id && self.state.is_registered()
    }

    pub(crate) fn invalid(&self) -> StorageError {
        StorageError::InvalidHandle {
            name: self.name().to_string(),
        }
    }
}

impl PartialEq for ColumnFamilyHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl Eq for ColumnFamilyHandle {}

impl fmt::Debug for ColumnFamilyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnFamilyHandle")
            .field("name", &self.name())
            .field("valid", &self.is_valid())
            .finish()
    }
}

// =============================================================================
// Manager
// =============================================================================

/// Column family operations of a session, from [`Database::column_families`]
pub struct ColumnFamilies<'a, E: StorageEngine> {
    db: &'a Database<E>,
}

impl<'a, E: StorageEngine> ColumnFamilies<'a, E> {
    pub(crate) fn new(db: &'a Database<E>) -> Self {
        Self { db }
    }

    /// Names of the currently valid families, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        let _engine = self.db.engine()?;
        Ok(self.db.registry.family_names())
    }

    /// Create a family with the session's default column family options
    pub fn create(&self, name: &str) -> Result<ColumnFamilyHandle> {
        self.create_with(name, &self.db.options.cf_options)
    }

    pub fn create_with(
        &self,
        name: &str,
        options: &ColumnFamilyOptions,
    ) -> Result<ColumnFamilyHandle> {
        let engine = self.db.engine()?;
        self.db.check_writable("create_column_family")?;
        let _ddl = self.db.ddl_lock.lock();

        if self.db.registry.contains_family(name) {
            return Err(StorageError::AlreadyExists {
                name: name.to_string(),
            });
        }

        let id = engine
            .create_column_family(options, name)
            .map_err(|e| StorageError::engine("create_column_family", describe(name, None), e))?;
        let state = self.db.registry.register_family(name, id)?;

        debug!(target: "rexkv::cf", name, id, "Created column family");
        Ok(ColumnFamilyHandle::new(state))
    }

    /// Drop a family
    ///
    /// The handle leaves the registry before the engine is asked; if the
    /// engine refuses, the same handle is put back and is valid again.
    pub fn drop(&self, handle: &ColumnFamilyHandle) -> Result<()> {
        let engine = self.db.engine()?;
        self.db.check_writable("drop_column_family")?;
        let _ddl = self.db.ddl_lock.lock();

        if !handle.is_usable_in(self.db.registry.session_id()) {
            return Err(handle.invalid());
        }
        if handle.name() == DEFAULT_COLUMN_FAMILY_NAME {
            return Err(StorageError::DefaultColumnFamily);
        }

        // Step 1: Unregister (invalidates every clone)
        if !self.db.registry.unregister_family(handle.state()) {
            return Err(handle.invalid());
        }

        // Step 2: Engine-level drop, restoring the handle on failure
        if let Err(e) = engine.drop_column_family(handle.id()) {
            self.db.registry.restore_family(Arc::clone(handle.state()));
            warn!(
                target: "rexkv::cf",
                name = handle.name(),
                error = %e,
                "Engine refused drop, column family re-registered"
            );
            return Err(StorageError::engine(
                "drop_column_family",
                describe(handle.name(), None),
                e,
            ));
        }

        // Step 3: Release the engine handle
        engine
            .destroy_column_family_handle(handle.id())
            .map_err(|e| {
                StorageError::engine(
                    "destroy_column_family_handle",
                    format!(
                        "Dropped CF but failed to destroy handle, {}",
                        describe(handle.name(), None)
                    ),
                    e,
                )
            })?;

        info!(target: "rexkv::cf", name = handle.name(), "Dropped column family");
        Ok(())
    }

    /// Handle for `name`, if the session tracks one
    pub fn get(&self, name: &str) -> Result<Option<ColumnFamilyHandle>> {
        let _engine = self.db.engine()?;
        Ok(self.db.registry.family(name).map(ColumnFamilyHandle::new))
    }

    pub fn default(&self) -> Result<ColumnFamilyHandle> {
        let _engine = self.db.engine()?;
        Ok(self.db.default_cf.clone())
    }
}
