//! Configuration for rexkv
//!
//! Option sets handed to the engine at open time, per column family, and per
//! read/write call. Defaults mirror the wrapped engine's defaults.

use tracing::warn;

/// Default write buffer size (64 MB)
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Default bloom filter density
pub const DEFAULT_BLOOM_BITS_PER_KEY: f64 = 10.0;

/// Compression applied to persisted blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionType {
    None,
    #[default]
    Snappy,
    Zlib,
    Bzip2,
    Lz4,
    Lz4hc,
    Xpress,
    Zstd,
    Disabled,
}

/// How merge operands are combined with the existing value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOperator {
    /// Append the operand to the existing value
    Concat,

    /// Treat values as little-endian u64 counters and add
    UInt64Add,
}

impl MergeOperator {
    /// Check an operand before anything is applied
    pub fn validate_operand(&self, operand: &[u8]) -> Result<(), String> {
        match self {
            MergeOperator::Concat => Ok(()),
            MergeOperator::UInt64Add if operand.len() == 8 => Ok(()),
            MergeOperator::UInt64Add => Err(format!(
                "UInt64Add operand must be 8 bytes, got {}",
                operand.len()
            )),
        }
    }

    /// Combine an operand with the existing value (if any)
    ///
    /// Operands must have passed [`MergeOperator::validate_operand`]. A
    /// malformed existing counter is treated as zero.
    pub fn merge(&self, existing: Option<&[u8]>, operand: &[u8]) -> Vec<u8> {
        match self {
            MergeOperator::Concat => {
                let mut merged = existing.map(<[u8]>::to_vec).unwrap_or_default();
                merged.extend_from_slice(operand);
                merged
            }
            MergeOperator::UInt64Add => {
                let base = match existing {
                    None => 0,
                    Some(bytes) => match <[u8; 8]>::try_from(bytes) {
                        Ok(raw) => u64::from_le_bytes(raw),
                        Err(_) => {
                            warn!(
                                target: "rexkv::engine",
                                len = bytes.len(),
                                "malformed UInt64Add counter, treating as zero"
                            );
                            0
                        }
                    },
                };
                let mut raw = [0u8; 8];
                raw.copy_from_slice(operand);
                base.wrapping_add(u64::from_le_bytes(raw)).to_le_bytes().to_vec()
            }
        }
    }
}

/// Table-format configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockBasedTableOptions {
    /// Bloom filter bits per key (None = no filter)
    pub bloom_filter_bits_per_key: Option<f64>,
}

// =============================================================================
// Column Family Options
// =============================================================================

/// Options applied to one column family
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnFamilyOptions {
    pub write_buffer_size: usize,
    pub compression: CompressionType,
    pub table: BlockBasedTableOptions,
    pub merge_operator: Option<MergeOperator>,
}

impl Default for ColumnFamilyOptions {
    fn default() -> Self {
        Self {
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            compression: CompressionType::Snappy,
            table: BlockBasedTableOptions::default(),
            merge_operator: None,
        }
    }
}

impl ColumnFamilyOptions {
    pub fn with_merge_operator(mut self, operator: MergeOperator) -> Self {
        self.merge_operator = Some(operator);
        self
    }
}

// =============================================================================
// Database Options
// =============================================================================

/// Options used to open a database
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    // -------------------------------------------------------------------------
    // Open Behaviour
    // -------------------------------------------------------------------------
    /// Create the store if it does not exist
    pub create_if_missing: bool,

    /// Fail if the store already exists
    pub error_if_exists: bool,

    // -------------------------------------------------------------------------
    // Engine Tuning
    // -------------------------------------------------------------------------
    /// Max open table files (-1 = unlimited)
    pub max_open_files: i32,

    /// Memtable size before flush (in bytes)
    pub write_buffer_size: usize,

    pub compression: CompressionType,

    pub max_background_jobs: i32,

    pub table: BlockBasedTableOptions,

    // -------------------------------------------------------------------------
    // Column Families
    // -------------------------------------------------------------------------
    /// Options used for the default family, for every family discovered on
    /// reattach, and for families created without explicit options
    pub cf_options: ColumnFamilyOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            create_if_missing: false,
            error_if_exists: false,
            max_open_files: -1,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            compression: CompressionType::Snappy,
            max_background_jobs: 2,
            table: BlockBasedTableOptions::default(),
            cf_options: ColumnFamilyOptions::default(),
        }
    }
}

impl Options {
    /// Create a new options builder
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    /// Size the background pool for `total_threads`
    pub fn increase_parallelism(&mut self, total_threads: i32) {
        self.max_background_jobs = total_threads;
    }

    /// Tune for a small store (main options only)
    pub fn optimize_for_small_db(&mut self) {
        self.max_open_files = 5000;
        self.write_buffer_size = 2 * 1024 * 1024;
    }

    /// Attach a bloom filter to both the main and the default column-family
    /// table configuration
    pub fn enable_bloom_filter(&mut self, bits_per_key: f64) {
        let table = BlockBasedTableOptions {
            bloom_filter_bits_per_key: Some(bits_per_key),
        };
        self.cf_options.table = table.clone();
        self.table = table;
    }
}

/// Builder for Options
#[derive(Default)]
pub struct OptionsBuilder {
    options: Options,
}

impl OptionsBuilder {
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.options.create_if_missing = value;
        self
    }

    pub fn error_if_exists(mut self, value: bool) -> Self {
        self.options.error_if_exists = value;
        self
    }

    pub fn max_open_files(mut self, value: i32) -> Self {
        self.options.max_open_files = value;
        self
    }

    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.options.write_buffer_size = size;
        self
    }

    pub fn compression(mut self, compression: CompressionType) -> Self {
        self.options.compression = compression;
        self
    }

    pub fn max_background_jobs(mut self, jobs: i32) -> Self {
        self.options.max_background_jobs = jobs;
        self
    }

    pub fn increase_parallelism(mut self, total_threads: i32) -> Self {
        self.options.increase_parallelism(total_threads);
        self
    }

    pub fn optimize_for_small_db(mut self) -> Self {
        self.options.optimize_for_small_db();
        self
    }

    pub fn enable_bloom_filter(mut self, bits_per_key: f64) -> Self {
        self.options.enable_bloom_filter(bits_per_key);
        self
    }

    /// Set the default column-family options
    pub fn cf_options(mut self, cf_options: ColumnFamilyOptions) -> Self {
        self.options.cf_options = cf_options;
        self
    }

    pub fn cf_write_buffer_size(mut self, size: usize) -> Self {
        self.options.cf_options.write_buffer_size = size;
        self
    }

    pub fn cf_compression(mut self, compression: CompressionType) -> Self {
        self.options.cf_options.compression = compression;
        self
    }

    pub fn merge_operator(mut self, operator: MergeOperator) -> Self {
        self.options.cf_options.merge_operator = Some(operator);
        self
    }

    pub fn build(self) -> Options {
        self.options
    }
}

// =============================================================================
// Per-call Options
// =============================================================================

/// Options for reads (get, iterators)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    pub fill_cache: bool,
    pub verify_checksums: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            fill_cache: true,
            verify_checksums: true,
        }
    }
}

/// Options for writes (put, delete, write)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOptions {
    /// fsync the log before acknowledging
    pub sync: bool,

    /// Skip the log for this write; it is lost only if the process dies
    /// before a clean close
    pub disable_wal: bool,
}
