//! Tests for the Database session
//!
//! These tests verify:
//! - Point reads and writes on arbitrary byte strings
//! - Missing keys versus empty values
//! - Persistence across reopen
//! - Read-only sessions
//! - Open failures (lock held, error_if_exists, create_if_missing)
//! - Close semantics (idempotent, concurrent, operations after close)

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;
use std::thread;

use common::{
    close_count, create_options, set_faults, setup_faulty_db, setup_temp_db, FaultPlan,
    FaultyEngine,
};
use proptest::prelude::*;
use rexkv::{
    CompressionType, Database, EngineErrorKind, Lifecycle, Options, ReadOptions, StorageError,
    WriteOptions,
};
use tempfile::TempDir;

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_put_get_delete() {
    let (_temp, db) = setup_temp_db();

    db.put(b"key1", b"value1").unwrap();
    assert_eq!(db.get(b"key1").unwrap(), Some(b"value1".to_vec()));

    db.delete(b"key1").unwrap();
    assert_eq!(db.get(b"key1").unwrap(), None);
}

#[test]
fn test_get_never_written_key() {
    let (_temp, db) = setup_temp_db();
    assert_eq!(db.get(b"missing").unwrap(), None);
}

#[test]
fn test_empty_value_is_not_missing() {
    let (_temp, db) = setup_temp_db();

    db.put(b"empty", b"").unwrap();
    assert_eq!(db.get(b"empty").unwrap(), Some(Vec::new()));
    assert_eq!(db.get(b"absent").unwrap(), None);
}

#[test]
fn test_empty_key_and_nul_bytes() {
    let (_temp, db) = setup_temp_db();

    db.put(b"", b"empty key").unwrap();
    db.put(b"a\x00b", b"\x00\x01\x00").unwrap();

    assert_eq!(db.get(b"").unwrap(), Some(b"empty key".to_vec()));
    assert_eq!(db.get(b"a\x00b").unwrap(), Some(b"\x00\x01\x00".to_vec()));
    assert_eq!(db.get(b"a").unwrap(), None);
}

#[test]
fn test_overwrite() {
    let (_temp, db) = setup_temp_db();

    db.put("key", "v1").unwrap();
    db.put("key", "v2").unwrap();
    assert_eq!(db.get("key").unwrap(), Some(b"v2".to_vec()));
}

#[test]
fn test_delete_missing_key_succeeds() {
    let (_temp, db) = setup_temp_db();
    db.delete(b"never-written").unwrap();
}

#[test]
fn test_explicit_options_variants() {
    let (_temp, db) = setup_temp_db();
    let write_options = WriteOptions {
        sync: true,
        disable_wal: false,
    };

    db.put_opt(b"k", b"v", &write_options).unwrap();
    assert_eq!(
        db.get_opt(b"k", &ReadOptions::default()).unwrap(),
        Some(b"v".to_vec())
    );
    db.delete_opt(b"k", &write_options).unwrap();
    assert_eq!(db.get(b"k").unwrap(), None);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_put_then_get_returns_value(
        key in proptest::collection::vec(any::<u8>(), 0..64),
        value in proptest::collection::vec(any::<u8>(), 0..256),
    ) {
        let (_temp, db) = setup_temp_db();
        db.put(&key, &value).unwrap();
        prop_assert_eq!(db.get(&key).unwrap(), Some(value));
    }
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_data_persists_across_reopen() {
    let temp_dir = TempDir::new().unwrap();

    {
        let db = Database::open(temp_dir.path(), create_options(), false).unwrap();
        db.put(b"persist", b"me").unwrap();
        db.put(b"gone", b"soon").unwrap();
        db.delete(b"gone").unwrap();
        assert!(db.close());
    }

    let db = Database::open(temp_dir.path(), Options::default(), false).unwrap();
    assert_eq!(db.get(b"persist").unwrap(), Some(b"me".to_vec()));
    assert_eq!(db.get(b"gone").unwrap(), None);
}

#[test]
fn test_drop_closes_and_releases_lock() {
    let temp_dir = TempDir::new().unwrap();

    let db = Database::open(temp_dir.path(), create_options(), false).unwrap();
    db.put(b"k", b"v").unwrap();
    drop(db);

    let db = Database::open(temp_dir.path(), create_options(), false).unwrap();
    assert_eq!(db.get(b"k").unwrap(), Some(b"v".to_vec()));
}

#[test]
fn test_open_default_creates_store() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("fresh");

    let db = Database::open_default(&path).unwrap();
    assert!(db.options().create_if_missing);
    assert_eq!(db.options().compression, CompressionType::Snappy);
    assert!(!db.is_read_only());
    assert_eq!(db.path(), path.as_path());
    assert!(path.join("wal.log").exists());
}

// =============================================================================
// Open Failure Tests
// =============================================================================

#[test]
fn test_missing_store_without_create_if_missing_fails() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("absent");

    let err = Database::open(&path, Options::default(), false).unwrap_err();
    assert!(matches!(err, StorageError::OpenFailed { .. }));
    assert!(err.to_string().contains("create_if_missing is false"));
}

#[test]
fn test_error_if_exists() {
    let temp_dir = TempDir::new().unwrap();
    Database::open(temp_dir.path(), create_options(), false)
        .unwrap()
        .close();

    let options = Options::builder()
        .create_if_missing(true)
        .error_if_exists(true)
        .build();
    let err = Database::open(temp_dir.path(), options, false).unwrap_err();
    assert!(matches!(err, StorageError::OpenFailed { .. }));
    assert!(err.to_string().contains("exists (error_if_exists is true)"));
}

#[test]
fn test_second_writer_is_locked_out() {
    let (temp, _db) = setup_temp_db();

    let err = Database::open(temp.path(), create_options(), false).unwrap_err();
    assert!(matches!(err, StorageError::OpenFailed { .. }));
    let message = err.to_string();
    assert!(message.contains("lock hold by current process"));
    assert!(message.contains("LOCK"));
    assert_eq!(
        err.engine_error().map(|e| e.kind()),
        Some(EngineErrorKind::IoError)
    );
}

#[test]
fn test_read_only_missing_store_fails() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("absent");

    let err = Database::open(&path, create_options(), true).unwrap_err();
    assert!(matches!(err, StorageError::OpenFailed { .. }));
    assert!(err.to_string().contains("No such file or directory"));
    assert!(!path.exists());
}

#[test]
fn test_failed_registration_closes_engine() {
    let temp_dir = TempDir::new().unwrap();
    Database::open(temp_dir.path(), create_options(), false)
        .unwrap()
        .close();
    set_faults(
        temp_dir.path(),
        FaultPlan {
            duplicate_listing: true,
            ..FaultPlan::default()
        },
    );

    let err =
        Database::<FaultyEngine>::open_with_engine(temp_dir.path(), Options::default(), false)
            .unwrap_err();
    assert!(matches!(err, StorageError::AlreadyExists { ref name } if name == "default"));
    assert_eq!(close_count(temp_dir.path()), 1);

    // The store is free for the next writer
    let db = Database::open(temp_dir.path(), Options::default(), false).unwrap();
    db.put(b"k", b"v").unwrap();
}

// =============================================================================
// Read-Only Tests
// =============================================================================

#[test]
fn test_read_only_session_rejects_mutation() {
    let temp_dir = TempDir::new().unwrap();
    {
        let db = Database::open(temp_dir.path(), create_options(), false).unwrap();
        db.put(b"k", b"v").unwrap();
    }

    let db = Database::open(temp_dir.path(), Options::default(), true).unwrap();
    assert!(db.is_read_only());
    assert_eq!(db.get(b"k").unwrap(), Some(b"v".to_vec()));

    let err = db.put(b"k", b"v2").unwrap_err();
    assert!(matches!(err, StorageError::ReadOnly { operation: "put" }));
    assert!(err.to_string().contains("read-only mode"));
    assert!(matches!(
        db.delete(b"k"),
        Err(StorageError::ReadOnly { operation: "delete" })
    ));

    let mut batch = rexkv::WriteBatch::new();
    batch.put(b"x", b"y");
    assert!(matches!(
        db.write(&batch),
        Err(StorageError::ReadOnly { operation: "write" })
    ));
    assert!(matches!(
        db.column_families().create("cf"),
        Err(StorageError::ReadOnly { .. })
    ));
    assert_eq!(db.get(b"k").unwrap(), Some(b"v".to_vec()));
}

#[test]
fn test_read_only_session_alongside_writer() {
    let (temp, writer) = setup_temp_db();
    writer.put(b"k", b"v").unwrap();

    let reader = Database::open(temp.path(), Options::default(), true).unwrap();
    assert_eq!(reader.get(b"k").unwrap(), Some(b"v".to_vec()));
}

// =============================================================================
// Close Tests
// =============================================================================

#[test]
fn test_close_is_idempotent() {
    let (_temp, db) = setup_temp_db();

    assert!(!db.is_closed());
    assert!(db.close());
    assert!(!db.close());
    assert!(db.is_closed());
    assert_eq!(db.lifecycle(), Lifecycle::Closed);
}

#[test]
fn test_operations_after_close_fail() {
    let (_temp, db) = setup_temp_db();
    db.put(b"k", b"v").unwrap();
    db.close();

    assert!(matches!(db.get(b"k"), Err(StorageError::Closed)));
    assert!(matches!(db.put(b"k", b"v"), Err(StorageError::Closed)));
    assert!(matches!(db.delete(b"k"), Err(StorageError::Closed)));
    assert!(matches!(db.iterator(), Err(StorageError::Closed)));
    assert!(matches!(
        db.write(&rexkv::WriteBatch::new()),
        Err(StorageError::Closed)
    ));
    assert!(matches!(db.column_families().list(), Err(StorageError::Closed)));
    assert_eq!(StorageError::Closed.to_string(), "Database is closed");
}

#[test]
fn test_closed_check_precedes_read_only_check() {
    let temp_dir = TempDir::new().unwrap();
    Database::open(temp_dir.path(), create_options(), false)
        .unwrap()
        .close();

    let db = Database::open(temp_dir.path(), Options::default(), true).unwrap();
    db.close();
    assert!(matches!(db.put(b"k", b"v"), Err(StorageError::Closed)));
}

#[test]
fn test_concurrent_close_single_teardown() {
    let (_temp, db) = setup_temp_db();
    let db = Arc::new(db);
    let _iter = db.iterator().unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let db = Arc::clone(&db);
            thread::spawn(move || db.close())
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
    assert!(db.is_closed());
    assert_eq!(db.live_iterator_count(), 0);
}

#[test]
fn test_close_while_writers_run() {
    let (_temp, db) = setup_temp_db();
    let db = Arc::new(db);

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for i in 0..200 {
                    match db.put(format!("t{}-{}", t, i), b"v") {
                        Ok(()) => {}
                        Err(StorageError::Closed) => return,
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
            })
        })
        .collect();

    db.close();
    for writer in writers {
        writer.join().unwrap();
    }
    assert!(matches!(db.get(b"t0-0"), Err(StorageError::Closed)));
}

#[test]
fn test_engine_close_failure_is_swallowed() {
    let (_temp, db) = setup_faulty_db(FaultPlan {
        fail_close: true,
        ..FaultPlan::default()
    });
    db.put(b"k", b"v").unwrap();
    assert!(db.close());
    assert!(db.is_closed());
}

// =============================================================================
// Session Options Tests
// =============================================================================

#[test]
fn test_default_options_are_session_scoped() {
    let (_temp, db) = setup_temp_db();

    assert_eq!(db.default_write_options(), WriteOptions::default());
    db.set_default_write_options(WriteOptions {
        sync: true,
        disable_wal: false,
    });
    assert!(db.default_write_options().sync);

    db.set_default_read_options(ReadOptions {
        fill_cache: false,
        verify_checksums: true,
    });
    assert!(!db.default_read_options().fill_cache);

    db.put(b"k", b"v").unwrap();
    assert_eq!(db.get(b"k").unwrap(), Some(b"v".to_vec()));
}

#[test]
fn test_disable_wal_writes_survive_clean_close() {
    let temp_dir = TempDir::new().unwrap();
    let unlogged = WriteOptions {
        sync: false,
        disable_wal: true,
    };
    {
        let db = Database::open(temp_dir.path(), create_options(), false).unwrap();
        db.put(b"logged", b"1").unwrap();
        db.put_opt(b"unlogged", b"2", &unlogged).unwrap();
        db.put_opt(b"shadowed", b"old", &unlogged).unwrap();
        db.put(b"shadowed", b"new").unwrap();
        db.delete_opt(b"logged", &unlogged).unwrap();
        assert!(db.close());
    }

    let db = Database::open(temp_dir.path(), Options::default(), false).unwrap();
    assert_eq!(db.get(b"logged").unwrap(), None);
    assert_eq!(db.get(b"unlogged").unwrap(), Some(b"2".to_vec()));
    assert_eq!(db.get(b"shadowed").unwrap(), Some(b"new".to_vec()));
}

#[test]
fn test_disable_wal_writes_to_dropped_family_do_not_block_reopen() {
    let temp_dir = TempDir::new().unwrap();
    {
        let db = Database::open(temp_dir.path(), create_options(), false).unwrap();
        let cf = db.column_families().create("scratch").unwrap();
        db.put_cf_opt(
            &cf,
            b"k",
            b"v",
            &WriteOptions {
                sync: false,
                disable_wal: true,
            },
        )
        .unwrap();
        db.column_families().drop(&cf).unwrap();
    }

    let db = Database::open(temp_dir.path(), Options::default(), false).unwrap();
    assert!(db.column_families().get("scratch").unwrap().is_none());
}
