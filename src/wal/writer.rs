//! WAL Writer
//!
//! Handles appending entries to the WAL file.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::error;

use crate::error::{EngineError, EngineResult};

use super::{Operation, WalEntry, WalReader};

/// When the writer fsyncs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },

    /// fsync only when [`WalWriter::sync`] is called
    OnRequest,
}

/// Writes entries to the WAL file
///
/// Every append is flushed to the OS; fsync follows the sync strategy. A
/// failed append is cut back off the file, so later appends never land
/// behind a torn frame. If that cut fails too the writer refuses further
/// appends.
pub struct WalWriter {
    writer: BufWriter<File>,
    /// End of the last complete frame
    offset: u64,
    poisoned: bool,
    next_lsn: u64,
    sync_strategy: WalSyncStrategy,
    uncommitted: usize,
}

impl WalWriter {
    /// Open or create a WAL file, continuing after its last valid LSN
    ///
    /// The file must already be free of torn tails (see
    /// [`super::WalRecovery::recover`]).
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> EngineResult<Self> {
        let last_lsn = if path.exists() {
            let mut last = 0;
            for entry in WalReader::open(path)?.entries() {
                last = entry?.lsn;
            }
            last
        } else {
            0
        };

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        let offset = file.seek(SeekFrom::End(0))?;

        Ok(Self {
            writer: BufWriter::new(file),
            offset,
            poisoned: false,
            next_lsn: last_lsn + 1,
            sync_strategy,
            uncommitted: 0,
        })
    }

    /// Append an entry to the WAL, returning its LSN
    pub fn append(&mut self, operation: Operation) -> EngineResult<u64> {
        if self.poisoned {
            return Err(EngineError::io(
                "WAL writer is unusable after a failed append; reopen the store",
            ));
        }
        let lsn = self.next_lsn;
        let frame = WalEntry::new(lsn, operation).serialize()?;

        if let Err(e) = self.write_frame(&frame) {
            if let Err(cut) = self.rollback() {
                error!(
                    target: "rexkv::wal",
                    offset = self.offset,
                    error = %cut,
                    "Failed to cut torn WAL frame, refusing further appends"
                );
                self.poisoned = true;
            }
            return Err(e.into());
        }
        self.offset += frame.len() as u64;
        self.next_lsn += 1;
        self.uncommitted += 1;

        match self.sync_strategy {
            WalSyncStrategy::EveryWrite => self.sync()?,
            WalSyncStrategy::EveryNEntries { count } if self.uncommitted >= count => self.sync()?,
            _ => {}
        }

        Ok(lsn)
    }

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.writer.write_all(frame)?;
        self.writer.flush()
    }

    /// Drop buffered bytes and truncate the file to the last complete frame
    fn rollback(&mut self) -> io::Result<()> {
        let file = self.writer.get_ref().try_clone()?;
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
        // into_parts hands back the unwritten buffer instead of flushing it
        let _ = stale.into_parts();

        let file = self.writer.get_mut();
        file.set_len(self.offset)?;
        file.seek(SeekFrom::Start(self.offset))?;
        Ok(())
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> EngineResult<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.uncommitted = 0;
        Ok(())
    }

    /// The LSN the next append will receive
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn
    }

    /// Entries appended since the last fsync
    pub fn uncommitted_count(&self) -> usize {
        self.uncommitted
    }
}
