//! Database Session
//!
//! [`Database`] owns the engine and enforces the session rules every call is
//! checked against: the session must be open, mutations need a writable
//! session, and column family handles must be valid and belong to it.
//!
//! ## Close sequence
//! ```text
//!   close() ──CAS Open→Closing──► engine.write()   (wait for in-flight calls)
//!                                     │
//!                                     ▼
//!                             registry.teardown()  (cursors, then handles)
//!                                     │
//!                                     ▼
//!                             engine.close()       ──► Closed
//! ```

mod column_family;
mod iterator;
mod registry;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{MappedRwLockReadGuard, Mutex, RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};

use crate::batch::WriteBatch;
use crate::config::{Options, ReadOptions, WriteOptions};
use crate::engine::{
    EngineCursor, FamilyDescriptor, FamilyId, LogEngine, StorageEngine, WriteOp,
    DEFAULT_COLUMN_FAMILY_NAME,
};
use crate::error::{describe, EngineError, Result, StorageError};

pub use column_family::{ColumnFamilies, ColumnFamilyHandle};
pub use iterator::DbIterator;
pub use registry::Lifecycle;

use registry::HandleRegistry;

/// An open key-value store
///
/// `Database` is `Send + Sync`; share it by reference or behind an `Arc`.
/// Dropping it closes it.
pub struct Database<E: StorageEngine = LogEngine> {
    path: PathBuf,
    options: Options,
    read_only: bool,

    /// None once closed
    engine: RwLock<Option<E>>,

    registry: Arc<HandleRegistry>,
    default_cf: ColumnFamilyHandle,

    /// Serializes column family create / drop
    ddl_lock: Mutex<()>,

    default_read_options: RwLock<ReadOptions>,
    default_write_options: RwLock<WriteOptions>,
}

impl Database<LogEngine> {
    /// Open or create a store at `path` on the reference engine
    ///
    /// An existing store is attached with every persisted column family,
    /// each opened with `options.cf_options`.
    pub fn open(path: impl AsRef<Path>, options: Options, read_only: bool) -> Result<Self> {
        Self::open_with_engine(path, options, read_only)
    }

    /// Open read-write, creating the store if it is missing
    pub fn open_default(path: impl AsRef<Path>) -> Result<Self> {
        let options = Options {
            create_if_missing: true,
            ..Options::default()
        };
        Self::open(path, options, false)
    }
}

impl<E: StorageEngine> Database<E> {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open or create a store at `path` on engine `E`
    ///
    /// Same rules as [`Database::open`]; name the engine with a turbofish,
    /// e.g. `Database::<MyEngine>::open_with_engine(..)`.
    pub fn open_with_engine(
        path: impl AsRef<Path>,
        options: Options,
        read_only: bool,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let open_failed = |source: EngineError| StorageError::OpenFailed {
            path: path.clone(),
            source,
        };

        // Step 1: Enumerate families (a missing store starts with just the default)
        let names = match E::list_column_families(&path, &options) {
            Ok(names) if !names.is_empty() => names,
            Ok(_) => vec![DEFAULT_COLUMN_FAMILY_NAME.to_string()],
            Err(e) if e.is_not_found() => {
                debug!(target: "rexkv::session", path = %path.display(), "No existing store");
                vec![DEFAULT_COLUMN_FAMILY_NAME.to_string()]
            }
            Err(e) => return Err(open_failed(e)),
        };

        // Step 2: Open the engine with every family
        let descriptors: Vec<FamilyDescriptor> = names
            .iter()
            .map(|name| FamilyDescriptor::new(name.clone(), options.cf_options.clone()))
            .collect();
        let (engine, ids) =
            E::open(&path, &options, &descriptors, read_only).map_err(open_failed)?;

        // Step 3: Register a handle per family (the engine is closed on any failure)
        let registry = HandleRegistry::new();
        let default_cf = match Self::register_families(&registry, &names, ids) {
            Ok(Some(default_cf)) => default_cf,
            Ok(None) => {
                Self::abandon_engine(engine, &path);
                return Err(open_failed(EngineError::invalid_argument(
                    "Default column family not found after opening",
                )));
            }
            Err(e) => {
                Self::abandon_engine(engine, &path);
                return Err(e);
            }
        };

        info!(
            target: "rexkv::session",
            path = %path.display(),
            read_only,
            column_families = names.len(),
            "Database opened"
        );

        Ok(Self {
            path,
            options,
            read_only,
            engine: RwLock::new(Some(engine)),
            registry,
            default_cf,
            ddl_lock: Mutex::new(()),
            default_read_options: RwLock::new(ReadOptions::default()),
            default_write_options: RwLock::new(WriteOptions::default()),
        })
    }

    /// Register every opened family, returning the default's handle
    fn register_families(
        registry: &Arc<HandleRegistry>,
        names: &[String],
        ids: Vec<FamilyId>,
    ) -> Result<Option<ColumnFamilyHandle>> {
        let mut default_cf = None;
        for (name, id) in names.iter().zip(ids) {
            let state = registry.register_family(name, id)?;
            if name == DEFAULT_COLUMN_FAMILY_NAME {
                default_cf = Some(ColumnFamilyHandle::new(state));
            }
        }
        Ok(default_cf)
    }

    /// Close an engine whose session never came up
    fn abandon_engine(engine: E, path: &Path) {
        if let Err(e) = engine.close() {
            warn!(
                target: "rexkv::session",
                path = %path.display(),
                error = %e,
                "Engine close failed"
            );
        }
    }

    /// Close the session
    ///
    /// Returns true if this call performed the teardown. Later and concurrent
    /// calls return false. Never fails; engine close errors are logged.
    pub fn close(&self) -> bool {
        if !self.registry.begin_close() {
            return false;
        }

        // Step 1: Wait out in-flight operations
        let mut engine = self.engine.write();

        // Step 2: Dispose of cursors, then invalidate handles
        let report = self.registry.teardown();

        // Step 3: Release the engine
        if let Some(engine) = engine.take() {
            if let Err(e) = engine.close() {
                warn!(
                    target: "rexkv::session",
                    path = %self.path.display(),
                    error = %e,
                    "Engine close failed"
                );
            }
        }
        drop(engine);
        self.registry.finish_close();

        info!(
            target: "rexkv::session",
            path = %self.path.display(),
            iterators_disposed = report.cursors_disposed,
            handles_invalidated = report.handles_invalidated,
            "Database closed"
        );
        true
    }

    pub fn is_closed(&self) -> bool {
        !self.registry.is_open()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.registry.lifecycle()
    }

    // =========================================================================
    // Session Checks
    // =========================================================================

    /// Engine access for one operation; the guard keeps close waiting
    pub(crate) fn engine(&self) -> Result<MappedRwLockReadGuard<'_, E>> {
        let guard = self.engine.read();
        if !self.registry.is_open() {
            return Err(StorageError::Closed);
        }
        RwLockReadGuard::try_map(guard, Option::as_ref).map_err(|_| StorageError::Closed)
    }

    pub(crate) fn check_writable(&self, operation: &'static str) -> Result<()> {
        if self.read_only {
            return Err(StorageError::ReadOnly { operation });
        }
        Ok(())
    }

    fn check_handle(&self, cf: &ColumnFamilyHandle) -> Result<()> {
        if !cf.is_usable_in(self.registry.session_id()) {
            return Err(cf.invalid());
        }
        Ok(())
    }

    /// Map an engine failure, reporting a family dropped mid-call as an invalid handle
    fn engine_failure(
        &self,
        operation: &'static str,
        cf: &ColumnFamilyHandle,
        key: Option<&[u8]>,
        source: EngineError,
    ) -> StorageError {
        if !cf.is_usable_in(self.registry.session_id()) {
            return cf.invalid();
        }
        StorageError::engine(operation, describe(cf.name(), key), source)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        self.get_cf_opt(&self.default_cf, key, &self.default_read_options())
    }

    pub fn get_opt(&self, key: impl AsRef<[u8]>, options: &ReadOptions) -> Result<Option<Vec<u8>>> {
        self.get_cf_opt(&self.default_cf, key, options)
    }

    pub fn get_cf(&self, cf: &ColumnFamilyHandle, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        self.get_cf_opt(cf, key, &self.default_read_options())
    }

    /// Look up a key; a missing key is `Ok(None)`
    pub fn get_cf_opt(
        &self,
        cf: &ColumnFamilyHandle,
        key: impl AsRef<[u8]>,
        options: &ReadOptions,
    ) -> Result<Option<Vec<u8>>> {
        let key = key.as_ref();
        let engine = self.engine()?;
        self.check_handle(cf)?;

        match engine.get(options, cf.id(), key) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(self.engine_failure("get", cf, Some(key), e)),
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    pub fn put(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        self.put_cf_opt(&self.default_cf, key, value, &self.default_write_options())
    }

    pub fn put_opt(
        &self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
        options: &WriteOptions,
    ) -> Result<()> {
        self.put_cf_opt(&self.default_cf, key, value, options)
    }

    pub fn put_cf(
        &self,
        cf: &ColumnFamilyHandle,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) -> Result<()> {
        self.put_cf_opt(cf, key, value, &self.default_write_options())
    }

    pub fn put_cf_opt(
        &self,
        cf: &ColumnFamilyHandle,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
        options: &WriteOptions,
    ) -> Result<()> {
        let key = key.as_ref();
        let engine = self.engine()?;
        self.check_writable("put")?;
        self.check_handle(cf)?;

        engine
            .put(options, cf.id(), key, value.as_ref())
            .map_err(|e| self.engine_failure("put", cf, Some(key), e))
    }

    pub fn delete(&self, key: impl AsRef<[u8]>) -> Result<()> {
        self.delete_cf_opt(&self.default_cf, key, &self.default_write_options())
    }

    pub fn delete_opt(&self, key: impl AsRef<[u8]>, options: &WriteOptions) -> Result<()> {
        self.delete_cf_opt(&self.default_cf, key, options)
    }

    pub fn delete_cf(&self, cf: &ColumnFamilyHandle, key: impl AsRef<[u8]>) -> Result<()> {
        self.delete_cf_opt(cf, key, &self.default_write_options())
    }

    /// Delete a key; deleting a missing key succeeds
    pub fn delete_cf_opt(
        &self,
        cf: &ColumnFamilyHandle,
        key: impl AsRef<[u8]>,
        options: &WriteOptions,
    ) -> Result<()> {
        let key = key.as_ref();
        let engine = self.engine()?;
        self.check_writable("delete")?;
        self.check_handle(cf)?;

        engine
            .delete(options, cf.id(), key)
            .map_err(|e| self.engine_failure("delete", cf, Some(key), e))
    }

    pub fn write(&self, batch: &WriteBatch) -> Result<()> {
        self.write_opt(batch, &self.default_write_options())
    }

    /// Apply a batch atomically
    ///
    /// Every handle the batch names is checked before anything reaches the
    /// engine.
    pub fn write_opt(&self, batch: &WriteBatch, options: &WriteOptions) -> Result<()> {
        let engine = self.engine()?;
        self.check_writable("write")?;

        let mut ops = Vec::with_capacity(batch.len());
        for entry in batch.iter() {
            let cf = entry.column_family().unwrap_or(&self.default_cf);
            self.check_handle(cf)?;
            ops.push(WriteOp {
                family: cf.id(),
                kind: entry.kind(),
                key: entry.key(),
                value: entry.value(),
            });
        }

        engine.write(options, &ops).map_err(|e| {
            // A family dropped between the check and the apply
            let dropped = batch
                .iter()
                .filter_map(|entry| entry.column_family())
                .find(|cf| !cf.is_usable_in(self.registry.session_id()));
            match dropped {
                Some(cf) => cf.invalid(),
                None => StorageError::engine("write", format!("batch of {} operations", ops.len()), e),
            }
        })
    }

    // =========================================================================
    // Iterators
    // =========================================================================

    pub fn iterator(&self) -> Result<DbIterator> {
        self.iterator_cf_opt(&self.default_cf, &self.default_read_options())
    }

    pub fn iterator_opt(&self, options: &ReadOptions) -> Result<DbIterator> {
        self.iterator_cf_opt(&self.default_cf, options)
    }

    pub fn iterator_cf(&self, cf: &ColumnFamilyHandle) -> Result<DbIterator> {
        self.iterator_cf_opt(cf, &self.default_read_options())
    }

    /// Lease a cursor over a snapshot of `cf`
    pub fn iterator_cf_opt(&self, cf: &ColumnFamilyHandle, options: &ReadOptions) -> Result<DbIterator> {
        let engine = self.engine()?;
        self.check_handle(cf)?;

        let cursor: Box<dyn EngineCursor> = engine
            .new_cursor(options, cf.id())
            .map_err(|e| self.engine_failure("iterator", cf, None, e))?;
        let (id, slot) = self.registry.register_cursor(cursor)?;

        debug!(target: "rexkv::session", id, column_family = cf.name(), "Iterator created");
        Ok(DbIterator::new(
            id,
            slot,
            Arc::downgrade(&self.registry),
            cf.clone(),
        ))
    }

    /// Iterators not yet dropped or disposed by close
    pub fn live_iterator_count(&self) -> usize {
        self.registry.live_cursor_count()
    }

    // =========================================================================
    // Column Families
    // =========================================================================

    pub fn column_families(&self) -> ColumnFamilies<'_, E> {
        ColumnFamilies::new(self)
    }

    // =========================================================================
    // Session Options
    // =========================================================================

    pub fn default_read_options(&self) -> ReadOptions {
        *self.default_read_options.read()
    }

    pub fn set_default_read_options(&self, options: ReadOptions) {
        *self.default_read_options.write() = options;
    }

    pub fn default_write_options(&self) -> WriteOptions {
        *self.default_write_options.read()
    }

    pub fn set_default_write_options(&self, options: WriteOptions) {
        *self.default_write_options.write() = options;
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The options the session was opened with
    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }
}

impl<E: StorageEngine> Drop for Database<E> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<E: StorageEngine> std::fmt::Debug for Database<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("read_only", &self.read_only)
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}
