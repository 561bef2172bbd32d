//! MemTable Module
//!
//! In-memory ordered table holding one column family of the reference engine.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Ordered keys (cursor order is byte-wise key order)
//! - Cheap point-in-time snapshots for cursors
//!
//! ## Data Structure Choice
//! `Arc<BTreeMap<Bytes, Bytes>>` with copy-on-write:
//! - A snapshot is an `Arc` clone, so cursor creation is O(1)
//! - Writers use `Arc::make_mut`, which only copies the map while a cursor
//!   still holds the previous version
//! - Locking is left to the engine, which guards each family set with one
//!   RwLock so a batch touching several families becomes visible at once

mod table;

pub use table::{MemTable, Snapshot};
