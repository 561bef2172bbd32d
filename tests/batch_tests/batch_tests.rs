//! Tests for Write Batches
//!
//! These tests verify:
//! - Staged operations apply in order
//! - Batches span column families atomically
//! - A batch naming an invalid handle applies nothing
//! - Merge operands and missing merge operators
//! - Batches survive reopen as a unit

#[path = "../common/mod.rs"]
mod common;

use common::{create_options, setup_temp_db};
use rexkv::{
    ColumnFamilyOptions, Database, EngineErrorKind, MergeOperator, Options, StorageError,
    WriteBatch, WriteOptions,
};
use tempfile::TempDir;

// =============================================================================
// Ordering Tests
// =============================================================================

#[test]
fn test_put_delete_put_yields_last_value() {
    let (_temp, db) = setup_temp_db();

    let mut batch = WriteBatch::new();
    batch.put(b"k1", b"v1");
    batch.delete(b"k1");
    batch.put(b"k1", b"v2");
    db.write(&batch).unwrap();

    assert_eq!(db.get(b"k1").unwrap(), Some(b"v2".to_vec()));
}

#[test]
fn test_put_then_delete_yields_none() {
    let (_temp, db) = setup_temp_db();
    db.put(b"k", b"old").unwrap();

    let mut batch = WriteBatch::new();
    batch.put(b"k", b"new");
    batch.delete(b"k");
    db.write(&batch).unwrap();

    assert_eq!(db.get(b"k").unwrap(), None);
}

#[test]
fn test_staging_does_not_touch_store() {
    let (_temp, db) = setup_temp_db();

    let mut batch = WriteBatch::new();
    batch.put(b"k", b"v");
    assert_eq!(db.get(b"k").unwrap(), None);

    batch.clear();
    db.write(&batch).unwrap();
    assert_eq!(db.get(b"k").unwrap(), None);
}

#[test]
fn test_batch_can_be_committed_twice() {
    let (_temp, db) = setup_temp_db();
    let counters = db
        .column_families()
        .create_with(
            "counters",
            &ColumnFamilyOptions::default().with_merge_operator(MergeOperator::UInt64Add),
        )
        .unwrap();

    let mut batch = WriteBatch::new();
    batch.merge_cf(&counters, b"n", 1u64.to_le_bytes());
    db.write(&batch).unwrap();
    db.write(&batch).unwrap();

    assert_eq!(
        db.get_cf(&counters, b"n").unwrap(),
        Some(2u64.to_le_bytes().to_vec())
    );
}

#[test]
fn test_empty_batch_is_noop() {
    let (_temp, db) = setup_temp_db();
    db.write(&WriteBatch::new()).unwrap();
}

// =============================================================================
// Column Family Tests
// =============================================================================

#[test]
fn test_batch_spans_families() {
    let (_temp, db) = setup_temp_db();
    let cf1 = db.column_families().create("cf1").unwrap();
    let cf2 = db.column_families().create("cf2").unwrap();

    let mut batch = WriteBatch::new();
    batch.put(b"k", b"default");
    batch.put_cf(&cf1, b"k", b"one");
    batch.put_cf(&cf2, b"k", b"two");
    batch.delete_cf(&cf2, b"k");
    db.write(&batch).unwrap();

    assert_eq!(db.get(b"k").unwrap(), Some(b"default".to_vec()));
    assert_eq!(db.get_cf(&cf1, b"k").unwrap(), Some(b"one".to_vec()));
    assert_eq!(db.get_cf(&cf2, b"k").unwrap(), None);
}

#[test]
fn test_batch_with_dropped_handle_applies_nothing() {
    let (_temp, db) = setup_temp_db();
    let live = db.column_families().create("live").unwrap();
    let doomed = db.column_families().create("doomed").unwrap();

    let mut batch = WriteBatch::new();
    batch.put(b"k", b"v");
    batch.put_cf(&live, b"k", b"v");
    batch.put_cf(&doomed, b"k", b"v");

    db.column_families().drop(&doomed).unwrap();

    let err = db.write(&batch).unwrap_err();
    assert!(matches!(err, StorageError::InvalidHandle { ref name } if name == "doomed"));
    assert_eq!(db.get(b"k").unwrap(), None);
    assert_eq!(db.get_cf(&live, b"k").unwrap(), None);
}

#[test]
fn test_batch_with_foreign_handle_applies_nothing() {
    let (_temp_a, db_a) = setup_temp_db();
    let (_temp_b, db_b) = setup_temp_db();
    let foreign = db_b.column_families().default().unwrap();

    let mut batch = WriteBatch::new();
    batch.put(b"mine", b"v");
    batch.put_cf(&foreign, b"theirs", b"v");

    assert!(matches!(
        db_a.write(&batch),
        Err(StorageError::InvalidHandle { .. })
    ));
    assert_eq!(db_a.get(b"mine").unwrap(), None);
    assert_eq!(db_b.get(b"theirs").unwrap(), None);
}

// =============================================================================
// Merge Tests
// =============================================================================

#[test]
fn test_merge_concat_on_default_family() {
    let temp_dir = TempDir::new().unwrap();
    let options = Options::builder()
        .create_if_missing(true)
        .merge_operator(MergeOperator::Concat)
        .build();
    let db = Database::open(temp_dir.path(), options, false).unwrap();

    db.put(b"log", b"a").unwrap();
    let mut batch = WriteBatch::new();
    batch.merge(b"log", b"b");
    batch.merge(b"log", b"c");
    db.write(&batch).unwrap();

    assert_eq!(db.get(b"log").unwrap(), Some(b"abc".to_vec()));
}

#[test]
fn test_merge_without_operator_fails_whole_batch() {
    let (_temp, db) = setup_temp_db();

    let mut batch = WriteBatch::new();
    batch.put(b"k", b"v");
    batch.merge(b"m", b"x");

    let err = db.write(&batch).unwrap_err();
    assert!(matches!(err, StorageError::Engine { operation: "write", .. }));
    assert_eq!(
        err.engine_error().map(|e| e.kind()),
        Some(EngineErrorKind::NotSupported)
    );
    assert_eq!(db.get(b"k").unwrap(), None);
}

#[test]
fn test_malformed_counter_operand_rejected() {
    let (_temp, db) = setup_temp_db();
    let counters = db
        .column_families()
        .create_with(
            "counters",
            &ColumnFamilyOptions::default().with_merge_operator(MergeOperator::UInt64Add),
        )
        .unwrap();

    let mut batch = WriteBatch::new();
    batch.merge_cf(&counters, b"n", b"short");
    let err = db.write(&batch).unwrap_err();
    assert_eq!(
        err.engine_error().map(|e| e.kind()),
        Some(EngineErrorKind::InvalidArgument)
    );
    assert_eq!(db.get_cf(&counters, b"n").unwrap(), None);
}

// =============================================================================
// Durability Tests
// =============================================================================

#[test]
fn test_synced_batch_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    {
        let db = Database::open(temp_dir.path(), create_options(), false).unwrap();
        let cf = db.column_families().create("cf").unwrap();

        let mut batch = WriteBatch::new();
        for i in 0..50 {
            batch.put(format!("d{}", i), b"x");
            batch.put_cf(&cf, format!("c{}", i), b"y");
        }
        db.write_opt(
            &batch,
            &WriteOptions {
                sync: true,
                disable_wal: false,
            },
        )
        .unwrap();
    }

    let db = Database::open(temp_dir.path(), Options::default(), false).unwrap();
    let cf = db.column_families().get("cf").unwrap().unwrap();
    assert_eq!(db.get(b"d49").unwrap(), Some(b"x".to_vec()));
    assert_eq!(db.get_cf(&cf, b"c0").unwrap(), Some(b"y".to_vec()));
}

#[test]
fn test_merged_values_survive_reopen_without_operator() {
    let temp_dir = TempDir::new().unwrap();
    {
        let db = Database::open(temp_dir.path(), create_options(), false).unwrap();
        let counters = db
            .column_families()
            .create_with(
                "counters",
                &ColumnFamilyOptions::default().with_merge_operator(MergeOperator::UInt64Add),
            )
            .unwrap();

        let mut batch = WriteBatch::new();
        batch.merge_cf(&counters, b"hits", 1u64.to_le_bytes());
        batch.merge_cf(&counters, b"hits", 2u64.to_le_bytes());
        db.write(&batch).unwrap();
        batch.clear();
        batch.merge_cf(&counters, b"hits", 4u64.to_le_bytes());
        db.write(&batch).unwrap();
    }

    // Reattached families use the session's options, which carry no operator
    let db = Database::open(temp_dir.path(), Options::default(), false).unwrap();
    let counters = db.column_families().get("counters").unwrap().unwrap();
    assert_eq!(
        db.get_cf(&counters, b"hits").unwrap(),
        Some(7u64.to_le_bytes().to_vec())
    );

    let mut batch = WriteBatch::new();
    batch.merge_cf(&counters, b"hits", 1u64.to_le_bytes());
    let err = db.write(&batch).unwrap_err();
    assert_eq!(
        err.engine_error().map(|e| e.kind()),
        Some(EngineErrorKind::NotSupported)
    );
}

#[test]
fn test_reopen_after_merging_into_dropped_family() {
    let temp_dir = TempDir::new().unwrap();
    {
        let db = Database::open(temp_dir.path(), create_options(), false).unwrap();
        let counters = db
            .column_families()
            .create_with(
                "counters",
                &ColumnFamilyOptions::default().with_merge_operator(MergeOperator::UInt64Add),
            )
            .unwrap();
        let mut batch = WriteBatch::new();
        batch.merge_cf(&counters, b"n", 1u64.to_le_bytes());
        db.write(&batch).unwrap();
        db.column_families().drop(&counters).unwrap();
        db.put(b"after", b"drop").unwrap();
    }

    let db = Database::open(temp_dir.path(), Options::default(), false).unwrap();
    assert!(db.column_families().get("counters").unwrap().is_none());
    assert_eq!(db.get(b"after").unwrap(), Some(b"drop".to_vec()));
}
