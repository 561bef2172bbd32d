//! Error types for rexkv
//!
//! Two layers:
//! - [`EngineError`]: what a storage engine reports (status kind + message)
//! - [`StorageError`]: what the session layer surfaces to callers

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using StorageError
pub type Result<T> = std::result::Result<T, StorageError>;

/// Result type alias for engine-level calls
pub type EngineResult<T> = std::result::Result<T, EngineError>;

// =============================================================================
// Engine Errors
// =============================================================================

/// Status kinds an engine may report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    NotFound,
    Corruption,
    NotSupported,
    InvalidArgument,
    IoError,
    Busy,
}

impl fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EngineErrorKind::NotFound => "NotFound",
            EngineErrorKind::Corruption => "Corruption",
            EngineErrorKind::NotSupported => "Not implemented",
            EngineErrorKind::InvalidArgument => "Invalid argument",
            EngineErrorKind::IoError => "IO error",
            EngineErrorKind::Busy => "Resource busy",
        };
        f.write_str(label)
    }
}

/// Error reported by a storage engine
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct EngineError {
    kind: EngineErrorKind,
    message: String,
}

impl EngineError {
    pub fn new(kind: EngineErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::NotFound, message)
    }

    pub fn corruption(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Corruption, message)
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::NotSupported, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::InvalidArgument, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::IoError, message)
    }

    pub fn kind(&self) -> EngineErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == EngineErrorKind::NotFound
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        let kind = if err.kind() == std::io::ErrorKind::NotFound {
            EngineErrorKind::NotFound
        } else {
            EngineErrorKind::IoError
        };
        Self::new(kind, err.to_string())
    }
}

impl From<bincode::Error> for EngineError {
    fn from(err: bincode::Error) -> Self {
        Self::corruption(format!("undecodable record: {}", err))
    }
}

// =============================================================================
// Session Errors
// =============================================================================

/// Unified error type for session operations
#[derive(Debug, Error)]
pub enum StorageError {
    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Failed to open database at {}: {source}", path.display())]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: EngineError,
    },

    #[error("Database is closed")]
    Closed,

    #[error("Cannot perform {operation} operation: Database opened in read-only mode")]
    ReadOnly { operation: &'static str },

    // -------------------------------------------------------------------------
    // Column Family Errors
    // -------------------------------------------------------------------------
    #[error("ColumnFamilyHandle '{name}' is invalid")]
    InvalidHandle { name: String },

    #[error("Column family '{name}' already exists")]
    AlreadyExists { name: String },

    #[error("Cannot drop the default column family")]
    DefaultColumnFamily,

    // -------------------------------------------------------------------------
    // Engine Errors
    // -------------------------------------------------------------------------
    #[error("Iterator error: {0}")]
    Iterator(#[source] EngineError),

    #[error("{operation} failed ({context}): {source}")]
    Engine {
        operation: &'static str,
        context: String,
        #[source]
        source: EngineError,
    },
}

impl StorageError {
    pub(crate) fn engine(
        operation: &'static str,
        context: impl Into<String>,
        source: EngineError,
    ) -> Self {
        StorageError::Engine {
            operation,
            context: context.into(),
            source,
        }
    }

    /// The engine status behind this error, if any
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            StorageError::OpenFailed { source, .. } => Some(source),
            StorageError::Iterator(source) => Some(source),
            StorageError::Engine { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Human-readable description of a family/key pair for error context
pub(crate) fn describe(family: &str, key: Option<&[u8]>) -> String {
    match key {
        Some(key) => format!("column family '{}', key \"{}\"", family, key.escape_ascii()),
        None => format!("column family '{}'", family),
    }
}
