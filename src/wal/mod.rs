//! Write-Ahead Log (WAL) Module
//!
//! Durability for the reference engine through append-only logging.
//!
//! ## Responsibilities
//! - Append one framed record per committed batch or family change
//! - CRC32 checksums for corruption detection
//! - Log Sequence Numbers (LSN) for ordering
//! - Crash recovery and replay (torn tails are truncated)
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Entry 1                                 │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Entry 2                                 │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! └─────────────────────────────────────────┘
//! ```
//!
//! A batch is a single entry, so a batch is either fully in the log or
//! (after tail truncation) not at all.

mod entry;
mod writer;
mod reader;
mod recovery;

pub use entry::{BatchRecord, Operation, RecordKind, WalEntry, HEADER_SIZE};
pub use writer::{WalSyncStrategy, WalWriter};
pub use reader::{WalIterator, WalReader};
pub use recovery::{RecoveryResult, WalRecovery};
