//! # rexkv
//!
//! A handle-safe access layer over an embedded ordered key-value engine:
//! - Sessions that can be closed while handles and iterators are still held
//! - Column families with checked, shareable handles
//! - Iterator leases that fail cleanly instead of touching freed cursors
//! - Atomic write batches across column families
//! - A reference engine with Write-Ahead Logging and crash recovery
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Database (session)                      │
//! │        get / put / delete / write / iterator / close        │
//! └──────┬───────────────────────┬──────────────────────┬───────┘
//!        │                       │                      │
//!        ▼                       ▼                      ▼
//!  ┌────────────┐        ┌───────────────┐      ┌─────────────┐
//!  │ WriteBatch │        │HandleRegistry │      │ DbIterator  │
//!  │  (staged)  │        │ handles +     │◄─────│  (lease)    │
//!  └────────────┘        │ cursor slots  │      └─────────────┘
//!                        └───────────────┘
//!        │
//!        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │               StorageEngine (LogEngine default)             │
//! │           WAL (append) ──► MemTable per family              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use rexkv::{Database, WriteBatch};
//!
//! # fn main() -> rexkv::Result<()> {
//! let db = Database::open_default("/tmp/rexkv-demo")?;
//! let users = db.column_families().create("users")?;
//!
//! let mut batch = WriteBatch::new();
//! batch.put(b"config", b"v1");
//! batch.put_cf(&users, b"alice", b"admin");
//! db.write(&batch)?;
//!
//! let mut iter = db.iterator_cf(&users)?;
//! iter.seek_to_first()?;
//! while iter.valid()? {
//!     println!("{:?}", iter.key()?);
//!     iter.next()?;
//! }
//!
//! db.close();
//! assert!(db.get(b"config").is_err());
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod wal;
pub mod memtable;
pub mod engine;

pub mod batch;
pub mod session;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{EngineError, EngineErrorKind, Result, StorageError};
pub use config::{
    BlockBasedTableOptions, ColumnFamilyOptions, CompressionType, MergeOperator, Options,
    OptionsBuilder, ReadOptions, WriteOptions,
};
pub use engine::{EngineCursor, LogEngine, StorageEngine, DEFAULT_COLUMN_FAMILY_NAME};
pub use batch::{BatchEntry, WriteBatch};
pub use session::{ColumnFamilies, ColumnFamilyHandle, Database, DbIterator, Lifecycle};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of rexkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
