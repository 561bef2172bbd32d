//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries and their framing.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Frame header: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// The operation to replay
    pub operation: Operation,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// An atomically committed write batch
    Batch { records: Vec<BatchRecord> },

    /// A column family came into existence
    CreateFamily { id: u32, name: String },

    /// A column family was dropped
    DropFamily { id: u32 },
}

/// One staged write inside a logged batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub family: u32,
    pub kind: RecordKind,
    pub key: Vec<u8>,
    /// Empty for deletes
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    Put,
    Delete,
    Merge,
}

impl WalEntry {
    /// Create an entry stamped with the current time
    pub fn new(lsn: u64, operation: Operation) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            lsn,
            operation,
            timestamp,
        }
    }

    /// Encode as a framed record: header followed by the bincode payload
    pub fn serialize(&self) -> EngineResult<Vec<u8>> {
        let data = bincode::serialize(self)?;
        let len = u32::try_from(data.len()).map_err(|_| {
            EngineError::invalid_argument(format!("WAL record too large: {} bytes", data.len()))
        })?;

        let mut frame = Vec::with_capacity(HEADER_SIZE + data.len());
        frame.extend_from_slice(&self.lsn.to_le_bytes());
        frame.extend_from_slice(&Self::compute_crc(self.lsn, &data).to_le_bytes());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&data);
        Ok(frame)
    }

    /// Decode one complete framed record
    pub fn deserialize(bytes: &[u8]) -> EngineResult<Self> {
        let header: &[u8; HEADER_SIZE] = bytes
            .get(..HEADER_SIZE)
            .and_then(|h| h.try_into().ok())
            .ok_or_else(|| {
                EngineError::corruption(format!(
                    "WAL frame shorter than header: {} bytes",
                    bytes.len()
                ))
            })?;
        let (lsn, crc, len) = Self::decode_header(header);

        let data = bytes
            .get(HEADER_SIZE..HEADER_SIZE + len)
            .ok_or_else(|| {
                EngineError::corruption(format!(
                    "WAL frame truncated: expected {} data bytes, got {}",
                    len,
                    bytes.len() - HEADER_SIZE
                ))
            })?;

        Self::decode_payload(lsn, crc, data)
    }

    /// Split a header into (lsn, crc, data length)
    pub(crate) fn decode_header(header: &[u8; HEADER_SIZE]) -> (u64, u32, usize) {
        let mut lsn = [0u8; 8];
        let mut crc = [0u8; 4];
        let mut len = [0u8; 4];
        lsn.copy_from_slice(&header[0..8]);
        crc.copy_from_slice(&header[8..12]);
        len.copy_from_slice(&header[12..16]);
        (
            u64::from_le_bytes(lsn),
            u32::from_le_bytes(crc),
            u32::from_le_bytes(len) as usize,
        )
    }

    /// Verify and decode a payload whose header has already been read
    pub(crate) fn decode_payload(lsn: u64, crc: u32, data: &[u8]) -> EngineResult<Self> {
        let actual = Self::compute_crc(lsn, data);
        if actual != crc {
            return Err(EngineError::corruption(format!(
                "WAL checksum mismatch at lsn {}: expected {:08x}, got {:08x}",
                lsn, crc, actual
            )));
        }

        let entry: WalEntry = bincode::deserialize(data)?;
        if entry.lsn != lsn {
            return Err(EngineError::corruption(format!(
                "WAL header lsn {} does not match payload lsn {}",
                lsn, entry.lsn
            )));
        }
        Ok(entry)
    }

    /// CRC32 over the LSN and the payload
    pub fn compute_crc(lsn: u64, data: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&lsn.to_le_bytes());
        hasher.update(data);
        hasher.finalize()
    }
}
