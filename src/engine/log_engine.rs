//! Log Engine
//!
//! Reference storage engine: one memtable per column family, every mutation
//! appended to a write-ahead log and replayed on open.
//!
//! ## Responsibilities
//! - Decide create-vs-attach and report a missing store as `NotFound`
//! - Hold the store's `LOCK` while open for writing
//! - Apply batches atomically across families
//! - Hand out snapshot cursors
//! - Track column family create / drop / destroy

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::{ColumnFamilyOptions, Options, ReadOptions, WriteOptions};
use crate::error::{EngineError, EngineResult};
use crate::memtable::MemTable;
use crate::wal::{BatchRecord, Operation, RecordKind, WalEntry, WalRecovery, WalSyncStrategy, WalWriter};

use super::{
    EngineCursor, FamilyDescriptor, FamilyId, SnapshotCursor, StorageEngine, WriteOp,
    DEFAULT_COLUMN_FAMILY_NAME, DEFAULT_FAMILY_ID,
};

/// The reference engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (write/create/drop): take `families` for writing, so a
///   batch touching several families becomes visible in one step
///   - Must acquire: families (write) → WAL
/// - **Reads** (get/new_cursor): take `families` for reading
pub struct LogEngine {
    path: PathBuf,

    /// Write-ahead log (None when opened read-only)
    wal: Option<Mutex<WalWriter>>,

    /// Every family the engine still holds a handle for
    families: RwLock<FamilySet>,

    /// Exclusive lock on `{path}/LOCK` (None when opened read-only)
    lock_file: Option<File>,
}

#[derive(Default)]
struct FamilySet {
    by_id: BTreeMap<FamilyId, FamilyData>,
    next_id: FamilyId,

    /// Applied with `disable_wal`, logged ahead of the next entry or at close
    unlogged: Vec<BatchRecord>,
}

struct FamilyData {
    name: String,
    options: ColumnFamilyOptions,
    table: MemTable,
    dropped: bool,
}

impl FamilySet {
    fn live_id(&self, name: &str) -> Option<FamilyId> {
        self.by_id
            .iter()
            .find(|(_, data)| !data.dropped && data.name == name)
            .map(|(id, _)| *id)
    }

    fn family(&self, id: FamilyId) -> EngineResult<&FamilyData> {
        self.by_id
            .get(&id)
            .ok_or_else(|| EngineError::invalid_argument(format!("Invalid column family: {}", id)))
    }

    fn writable_family(&mut self, id: FamilyId) -> EngineResult<&mut FamilyData> {
        let data = self
            .by_id
            .get_mut(&id)
            .ok_or_else(|| EngineError::invalid_argument(format!("Invalid column family: {}", id)))?;
        if data.dropped {
            return Err(EngineError::invalid_argument(format!(
                "Column family '{}' has been dropped",
                data.name
            )));
        }
        Ok(data)
    }

    fn insert(&mut self, id: FamilyId, name: String, options: ColumnFamilyOptions) {
        self.by_id.insert(
            id,
            FamilyData {
                name,
                options,
                table: MemTable::new(),
                dropped: false,
            },
        );
        self.next_id = self.next_id.max(id + 1);
    }

    /// Check a batch and turn it into the records to log
    ///
    /// Merges are folded into puts here, so replay never needs a merge
    /// operator. Nothing is logged or applied when this fails.
    fn prepare(&self, ops: &[WriteOp<'_>]) -> EngineResult<Vec<BatchRecord>> {
        // Values already written earlier in this batch (None = deleted)
        let mut staged: HashMap<(FamilyId, &[u8]), Option<Vec<u8>>> = HashMap::new();
        let mut records = Vec::with_capacity(ops.len());

        for op in ops {
            let data = self.family(op.family)?;
            if data.dropped {
                return Err(EngineError::invalid_argument(format!(
                    "Column family '{}' has been dropped",
                    data.name
                )));
            }

            let (kind, value) = match op.kind {
                RecordKind::Put => (RecordKind::Put, op.value.to_vec()),
                RecordKind::Delete => (RecordKind::Delete, Vec::new()),
                RecordKind::Merge => {
                    let operator = data.options.merge_operator.ok_or_else(|| {
                        EngineError::not_supported(format!(
                            "Merge operator is not configured for column family '{}'",
                            data.name
                        ))
                    })?;
                    operator
                        .validate_operand(op.value)
                        .map_err(EngineError::invalid_argument)?;
                    let existing = staged
                        .get(&(op.family, op.key))
                        .cloned()
                        .unwrap_or_else(|| data.table.get(op.key).map(|v| v.to_vec()));
                    (RecordKind::Put, operator.merge(existing.as_deref(), op.value))
                }
            };

            staged.insert(
                (op.family, op.key),
                (kind == RecordKind::Put).then(|| value.clone()),
            );
            records.push(BatchRecord {
                family: op.family,
                kind,
                key: op.key.to_vec(),
                value,
            });
        }
        Ok(records)
    }

    /// Apply a prepared or replayed batch
    fn apply(&mut self, records: &[BatchRecord]) -> EngineResult<()> {
        for record in records {
            let data = self.writable_family(record.family)?;
            let key = Bytes::copy_from_slice(&record.key);
            match record.kind {
                RecordKind::Put => {
                    data.table.put(key, Bytes::copy_from_slice(&record.value));
                }
                RecordKind::Delete => {
                    data.table.delete(&key);
                }
                RecordKind::Merge => {
                    let operator = data.options.merge_operator.ok_or_else(|| {
                        EngineError::not_supported(format!(
                            "Merge operator is not configured for column family '{}'",
                            data.name
                        ))
                    })?;
                    data.table.merge(key, &record.value, operator);
                }
            }
        }
        Ok(())
    }

    /// Replay one logged operation
    fn replay(&mut self, entry: WalEntry, descriptors: &[FamilyDescriptor]) -> EngineResult<()> {
        match entry.operation {
            Operation::Batch { records } => self.apply(&records),
            Operation::CreateFamily { id, name } => {
                let options = descriptors
                    .iter()
                    .find(|d| d.name == name)
                    .map(|d| d.options.clone())
                    .unwrap_or_default();
                self.insert(id, name, options);
                Ok(())
            }
            Operation::DropFamily { id } => {
                self.by_id.remove(&id);
                Ok(())
            }
        }
    }
}

impl LogEngine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_FILENAME: &'static str = "wal.log";
    const LOCK_FILENAME: &'static str = "LOCK";

    fn wal_path(path: &Path) -> PathBuf {
        path.join(Self::WAL_FILENAME)
    }

    /// Take the store's exclusive lock
    fn acquire_lock(path: &Path) -> EngineResult<File> {
        let lock_path = path.join(Self::LOCK_FILENAME);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)?;
        file.try_lock_exclusive().map_err(|e| {
            EngineError::io(format!(
                "While lock file: {}: lock hold by current process or another process: {}",
                lock_path.display(),
                e
            ))
        })?;
        debug!(target: "rexkv::engine", path = %lock_path.display(), "Acquired store lock");
        Ok(file)
    }

    /// Build the family set from the log
    fn replay_log(
        entries: Vec<WalEntry>,
        descriptors: &[FamilyDescriptor],
    ) -> EngineResult<FamilySet> {
        let mut set = FamilySet::default();
        let default_options = descriptors
            .iter()
            .find(|d| d.name == DEFAULT_COLUMN_FAMILY_NAME)
            .map(|d| d.options.clone())
            .unwrap_or_default();
        set.insert(
            DEFAULT_FAMILY_ID,
            DEFAULT_COLUMN_FAMILY_NAME.to_string(),
            default_options,
        );

        for entry in entries {
            let lsn = entry.lsn;
            set.replay(entry, descriptors).map_err(|e| {
                EngineError::corruption(format!("replaying WAL entry {}: {}", lsn, e))
            })?;
        }
        Ok(set)
    }

    /// Append one entry, preceded by any writes applied without the log
    fn log(&self, families: &mut FamilySet, operation: Operation, sync: bool) -> EngineResult<()> {
        let wal = self
            .wal
            .as_ref()
            .ok_or_else(|| EngineError::not_supported("Not supported operation in read only mode."))?;
        let mut wal = wal.lock();
        Self::log_unlogged(&mut wal, families)?;
        wal.append(operation)?;
        if sync {
            wal.sync()?;
        }
        Ok(())
    }

    fn log_unlogged(wal: &mut WalWriter, families: &mut FamilySet) -> EngineResult<()> {
        if families.unlogged.is_empty() {
            return Ok(());
        }
        let records = std::mem::take(&mut families.unlogged);
        debug!(
            target: "rexkv::engine",
            records = records.len(),
            "Logging writes made without the WAL"
        );
        if let Err(e) = wal.append(Operation::Batch {
            records: records.clone(),
        }) {
            families.unlogged = records;
            return Err(e);
        }
        Ok(())
    }

    /// The directory this engine serves
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageEngine for LogEngine {
    fn list_column_families(path: &Path, _options: &Options) -> EngineResult<Vec<String>> {
        let wal_path = Self::wal_path(path);
        if !wal_path.exists() {
            return Err(EngineError::not_found(format!(
                "{}: No such file or directory",
                wal_path.display()
            )));
        }

        let (entries, _) = WalRecovery::read(&wal_path)?;
        let mut families: BTreeMap<FamilyId, String> = BTreeMap::new();
        families.insert(DEFAULT_FAMILY_ID, DEFAULT_COLUMN_FAMILY_NAME.to_string());
        for entry in entries {
            match entry.operation {
                Operation::CreateFamily { id, name } => {
                    families.insert(id, name);
                }
                Operation::DropFamily { id } => {
                    families.remove(&id);
                }
                Operation::Batch { .. } => {}
            }
        }
        Ok(families.into_values().collect())
    }

    fn open(
        path: &Path,
        options: &Options,
        descriptors: &[FamilyDescriptor],
        read_only: bool,
    ) -> EngineResult<(Self, Vec<FamilyId>)> {
        let wal_path = Self::wal_path(path);
        let exists = wal_path.exists();

        // Step 1: Decide create vs attach
        if read_only && !exists {
            return Err(EngineError::not_found(format!(
                "{}: No such file or directory",
                wal_path.display()
            )));
        }
        if exists && options.error_if_exists {
            return Err(EngineError::invalid_argument(format!(
                "{}: exists (error_if_exists is true)",
                path.display()
            )));
        }
        if !exists && !options.create_if_missing {
            return Err(EngineError::invalid_argument(format!(
                "{}: does not exist (create_if_missing is false)",
                path.display()
            )));
        }

        // Step 2: Directory and lock (writers only)
        let lock_file = if read_only {
            None
        } else {
            fs::create_dir_all(path)?;
            Some(Self::acquire_lock(path)?)
        };

        // Step 3: Recover the log (writers cut torn tails, readers leave the file alone)
        let entries = if exists {
            let (entries, result) = if read_only {
                WalRecovery::read(&wal_path)?
            } else {
                WalRecovery::recover(&wal_path)?
            };
            info!(
                target: "rexkv::engine",
                path = %path.display(),
                entries_recovered = result.entries_recovered,
                entries_corrupted = result.entries_corrupted,
                last_lsn = result.last_lsn,
                was_truncated = result.was_truncated,
                "WAL recovery complete"
            );
            entries
        } else {
            Vec::new()
        };

        // Step 4: Rebuild families and check the caller described all of them
        let families = Self::replay_log(entries, descriptors)?;
        let mut ids = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let id = families.live_id(&descriptor.name).ok_or_else(|| {
                EngineError::invalid_argument(format!(
                    "Column family not found: {}",
                    descriptor.name
                ))
            })?;
            ids.push(id);
        }
        let undescribed: Vec<&str> = families
            .by_id
            .values()
            .filter(|data| !descriptors.iter().any(|d| d.name == data.name))
            .map(|data| data.name.as_str())
            .collect();
        if !undescribed.is_empty() {
            return Err(EngineError::invalid_argument(format!(
                "Column families not opened: {}",
                undescribed.join(", ")
            )));
        }

        // Step 5: Log writer (creates the store marker on first open)
        let wal = if read_only {
            None
        } else {
            Some(Mutex::new(WalWriter::open(&wal_path, WalSyncStrategy::OnRequest)?))
        };

        Ok((
            Self {
                path: path.to_path_buf(),
                wal,
                families: RwLock::new(families),
                lock_file,
            },
            ids,
        ))
    }

    fn get(&self, _options: &ReadOptions, family: FamilyId, key: &[u8]) -> EngineResult<Vec<u8>> {
        let families = self.families.read();
        families
            .family(family)?
            .table
            .get(key)
            .map(|value| value.to_vec())
            .ok_or_else(|| EngineError::not_found(""))
    }

    fn write(&self, options: &WriteOptions, ops: &[WriteOp<'_>]) -> EngineResult<()> {
        if ops.is_empty() {
            return Ok(());
        }
        if self.wal.is_none() {
            return Err(EngineError::not_supported("Not supported operation in read only mode."));
        }

        let mut families = self.families.write();
        let records = families.prepare(ops)?;

        if options.disable_wal {
            families.apply(&records)?;
            families.unlogged.extend(records);
            return Ok(());
        }

        // Step 1: Log first (one entry per batch keeps it all-or-nothing on replay)
        self.log(
            &mut families,
            Operation::Batch {
                records: records.clone(),
            },
            options.sync,
        )?;

        // Step 2: Apply under the same write lock
        families.apply(&records)
    }

    fn new_cursor(
        &self,
        _options: &ReadOptions,
        family: FamilyId,
    ) -> EngineResult<Box<dyn EngineCursor>> {
        let families = self.families.read();
        let snapshot = families.family(family)?.table.snapshot();
        Ok(Box::new(SnapshotCursor::new(snapshot)))
    }

    fn create_column_family(
        &self,
        options: &ColumnFamilyOptions,
        name: &str,
    ) -> EngineResult<FamilyId> {
        let mut families = self.families.write();
        if families.live_id(name).is_some() {
            return Err(EngineError::invalid_argument(format!(
                "Column family already exists: {}",
                name
            )));
        }

        let id = families.next_id;
        self.log(
            &mut families,
            Operation::CreateFamily {
                id,
                name: name.to_string(),
            },
            true,
        )?;
        families.insert(id, name.to_string(), options.clone());
        Ok(id)
    }

    fn drop_column_family(&self, family: FamilyId) -> EngineResult<()> {
        if family == DEFAULT_FAMILY_ID {
            return Err(EngineError::invalid_argument("Can't drop default column family"));
        }

        let mut families = self.families.write();
        families.writable_family(family)?;
        self.log(&mut families, Operation::DropFamily { id: family }, true)?;
        if let Some(data) = families.by_id.get_mut(&family) {
            data.dropped = true;
        }
        Ok(())
    }

    fn destroy_column_family_handle(&self, family: FamilyId) -> EngineResult<()> {
        let mut families = self.families.write();
        let dropped = families.family(family)?.dropped;
        if dropped {
            // Open cursors keep their own snapshot of the table
            families.by_id.remove(&family);
        }
        Ok(())
    }

    fn close(self) -> EngineResult<()> {
        let result = match &self.wal {
            Some(wal) => {
                let mut families = self.families.write();
                let mut wal = wal.lock();
                let logged = Self::log_unlogged(&mut wal, &mut families);
                logged.and_then(|()| wal.sync())
            }
            None => Ok(()),
        };
        if let Some(lock_file) = &self.lock_file {
            if let Err(e) = lock_file.unlock() {
                warn!(target: "rexkv::engine", path = %self.path.display(), error = %e, "Failed to release store lock");
            }
        }
        result
    }
}
