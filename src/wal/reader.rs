//! WAL Reader
//!
//! Handles reading entries from the WAL file.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::{EngineError, EngineResult};

use super::{WalEntry, HEADER_SIZE};

/// Reads entries from the WAL file
pub struct WalReader {
    reader: BufReader<File>,
    /// Offset just past the last entry that decoded cleanly
    valid_offset: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> EngineResult<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            valid_offset: 0,
        })
    }

    /// Read the next entry from the WAL
    ///
    /// Returns `Ok(None)` at a clean end of file and `Err(Corruption)` for a
    /// partial or damaged frame.
    pub fn next_entry(&mut self) -> EngineResult<Option<WalEntry>> {
        let mut header = [0u8; HEADER_SIZE];
        let read = read_fully(&mut self.reader, &mut header)?;
        if read == 0 {
            return Ok(None);
        }
        if read < HEADER_SIZE {
            return Err(EngineError::corruption(format!(
                "partial WAL header at offset {}: {} of {} bytes",
                self.valid_offset, read, HEADER_SIZE
            )));
        }

        let (lsn, crc, len) = WalEntry::decode_header(&header);
        // A damaged length field must not drive a huge allocation
        let mut data = Vec::new();
        (&mut self.reader).take(len as u64).read_to_end(&mut data)?;
        if data.len() < len {
            return Err(EngineError::corruption(format!(
                "partial WAL record at offset {}: {} of {} bytes",
                self.valid_offset,
                data.len(),
                len
            )));
        }

        let entry = WalEntry::decode_payload(lsn, crc, &data)?;
        self.valid_offset += (HEADER_SIZE + len) as u64;
        Ok(Some(entry))
    }

    /// Offset just past the last entry that decoded cleanly
    pub fn valid_offset(&self) -> u64 {
        self.valid_offset
    }

    /// Iterate over entries until the end of file or the first bad frame
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }
}

/// Iterator over WAL entries
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = EngineResult<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Read until `buf` is full or EOF, returning the byte count
fn read_fully(reader: &mut impl Read, buf: &mut [u8]) -> EngineResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
