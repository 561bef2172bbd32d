//! Engine Module
//!
//! The contract between the session layer and a storage engine, plus the
//! reference engine that ships with the crate.
//!
//! The session layer never reaches into engine internals; everything it
//! needs is on [`StorageEngine`] and [`EngineCursor`]:
//!
//! ```text
//!   Database ──owns──► StorageEngine ──creates──► EngineCursor
//!      │                    ▲                         ▲
//!      │ FamilyId           │ open / list              │ owned by a
//!      ▼                    │                          │ registry slot
//!   ColumnFamilyHandle ─────┘                       DbIterator
//! ```

mod cursor;
mod log_engine;

use std::path::Path;

use crate::config::{ColumnFamilyOptions, Options, ReadOptions, WriteOptions};
use crate::error::EngineResult;
use crate::wal::RecordKind;

pub use cursor::SnapshotCursor;
pub use log_engine::LogEngine;

/// Engine-level identifier of a column family
pub type FamilyId = u32;

/// Name of the family every store has
pub const DEFAULT_COLUMN_FAMILY_NAME: &str = "default";

/// Id of the default family
pub const DEFAULT_FAMILY_ID: FamilyId = 0;

/// A family to open, with the options to open it with
#[derive(Debug, Clone)]
pub struct FamilyDescriptor {
    pub name: String,
    pub options: ColumnFamilyOptions,
}

impl FamilyDescriptor {
    pub fn new(name: impl Into<String>, options: ColumnFamilyOptions) -> Self {
        Self {
            name: name.into(),
            options,
        }
    }
}

/// One resolved write inside an atomic batch
#[derive(Debug, Clone, Copy)]
pub struct WriteOp<'a> {
    pub family: FamilyId,
    pub kind: RecordKind,
    pub key: &'a [u8],
    /// Empty for deletes
    pub value: &'a [u8],
}

/// Storage engine contract
///
/// Implementations are internally synchronised: every method takes `&self`
/// and may be called from many threads at once.
pub trait StorageEngine: Send + Sync + Sized + 'static {
    /// Names of the persisted families, `default` first
    ///
    /// Must return a `NotFound` error when no store exists at `path`.
    fn list_column_families(path: &Path, options: &Options) -> EngineResult<Vec<String>>;

    /// Open a store, returning the ids of `families` in the same order
    fn open(
        path: &Path,
        options: &Options,
        families: &[FamilyDescriptor],
        read_only: bool,
    ) -> EngineResult<(Self, Vec<FamilyId>)>;

    /// Look up a key; a missing key is a `NotFound` error
    fn get(&self, options: &ReadOptions, family: FamilyId, key: &[u8]) -> EngineResult<Vec<u8>>;

    /// Apply every op or none
    fn write(&self, options: &WriteOptions, ops: &[WriteOp<'_>]) -> EngineResult<()>;

    fn put(
        &self,
        options: &WriteOptions,
        family: FamilyId,
        key: &[u8],
        value: &[u8],
    ) -> EngineResult<()> {
        self.write(
            options,
            &[WriteOp {
                family,
                kind: RecordKind::Put,
                key,
                value,
            }],
        )
    }

    fn delete(&self, options: &WriteOptions, family: FamilyId, key: &[u8]) -> EngineResult<()> {
        self.write(
            options,
            &[WriteOp {
                family,
                kind: RecordKind::Delete,
                key,
                value: &[],
            }],
        )
    }

    /// A cursor over a point-in-time view of one family
    fn new_cursor(
        &self,
        options: &ReadOptions,
        family: FamilyId,
    ) -> EngineResult<Box<dyn EngineCursor>>;

    fn create_column_family(
        &self,
        options: &ColumnFamilyOptions,
        name: &str,
    ) -> EngineResult<FamilyId>;

    /// Logically drop a family; the handle stays usable until destroyed
    fn drop_column_family(&self, family: FamilyId) -> EngineResult<()>;

    /// Release the engine-level handle object of a family
    fn destroy_column_family_handle(&self, family: FamilyId) -> EngineResult<()>;

    /// Flush and release engine resources
    fn close(self) -> EngineResult<()> {
        Ok(())
    }
}

/// Engine cursor contract
///
/// `key` and `value` return `None` whenever the cursor is not positioned on
/// an entry. Faults met while moving are reported by `status`, not by the
/// movement calls.
pub trait EngineCursor: Send {
    fn valid(&self) -> bool;
    fn seek_to_first(&mut self);
    fn seek_to_last(&mut self);
    /// Position at the first key >= `target`
    fn seek(&mut self, target: &[u8]);
    /// Position at the last key <= `target`
    fn seek_for_prev(&mut self, target: &[u8]);
    fn next(&mut self);
    fn prev(&mut self);
    fn key(&self) -> Option<&[u8]>;
    fn value(&self) -> Option<&[u8]>;
    fn status(&self) -> EngineResult<()>;
}
