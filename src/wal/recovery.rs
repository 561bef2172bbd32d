//! WAL Recovery
//!
//! Replays the WAL after a restart, cutting off any torn tail.

use std::fs::OpenOptions;
use std::path::Path;

use tracing::warn;

use crate::error::EngineResult;

use super::{WalEntry, WalReader};

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of corrupted entries skipped (everything after the first bad
    /// frame is unreachable, so this is 0 or 1)
    pub entries_corrupted: u64,

    /// Last valid LSN
    pub last_lsn: u64,

    /// Whether the WAL was truncated (partial writes removed)
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Recover entries from a WAL file
    ///
    /// This will:
    /// 1. Read all valid entries
    /// 2. Stop at the first damaged or partial frame
    /// 3. Truncate the file to the last valid entry
    /// 4. Return all valid entries in order
    pub fn recover(path: &Path) -> EngineResult<(Vec<WalEntry>, RecoveryResult)> {
        Self::scan(path, true)
    }

    /// Read entries without modifying the file (read-only attach)
    pub fn read(path: &Path) -> EngineResult<(Vec<WalEntry>, RecoveryResult)> {
        Self::scan(path, false)
    }

    /// Verify integrity of a WAL file without modifying it
    pub fn verify(path: &Path) -> EngineResult<RecoveryResult> {
        Self::scan(path, false).map(|(_, result)| result)
    }

    fn scan(path: &Path, truncate: bool) -> EngineResult<(Vec<WalEntry>, RecoveryResult)> {
        let mut reader = WalReader::open(path)?;
        let mut entries = Vec::new();
        let mut result = RecoveryResult::default();

        loop {
            match reader.next_entry() {
                Ok(Some(entry)) => {
                    result.entries_recovered += 1;
                    result.last_lsn = entry.lsn;
                    entries.push(entry);
                }
                Ok(None) => break,
                Err(e) => {
                    result.entries_corrupted += 1;
                    warn!(
                        target: "rexkv::wal",
                        path = %path.display(),
                        valid_offset = reader.valid_offset(),
                        error = %e,
                        "WAL tail is damaged"
                    );
                    if truncate {
                        let file = OpenOptions::new().write(true).open(path)?;
                        file.set_len(reader.valid_offset())?;
                        file.sync_all()?;
                        result.was_truncated = true;
                    }
                    break;
                }
            }
        }

        Ok((entries, result))
    }
}
