//! Log Stream Tests
//!
//! - Records stream in non-decreasing LSN order, across files and reopens
//! - Metadata and checkpoint operations are never decoded
//! - Index operations decode through the catalog's key patterns
//! - A corrupt frame is reported and ends the stream

mod common;

use std::fs;

use bson::doc;
use common::*;
use storescope::catalog::{Catalog, CatalogResolver};
use storescope::engine::{Connection, EngineConfig, LogSettings, OpType, RecordType};
use storescope::errors::InspectResult;
use storescope::journal::{Decoded, LogReader, LogRecord};
use storescope::keystring::KeyPattern;
use storescope::table::{Kind, TableAccessor};

fn stream_all(conn: &Connection, catalog: &Catalog) -> Vec<LogRecord> {
    let mut reader = LogReader::open(conn, catalog, native()).unwrap();
    let records = reader.stream().collect::<InspectResult<Vec<_>>>().unwrap();
    reader.close().unwrap();
    records
}

fn insert_rows(conn: &Connection, identity: &str, keys: std::ops::Range<i64>) {
    let mut table = TableAccessor::open(conn, identity, Kind::Collection, native()).unwrap();
    for key in keys {
        table.insert(key, &doc! { "n": key }).unwrap();
    }
    table.close().unwrap();
}

// =============================================================================
// Ordering
// =============================================================================

#[test]
fn test_lsn_order_across_rotation_and_reopen() {
    let temp_dir = create_temp_data_dir();
    let config = EngineConfig {
        create: true,
        log: LogSettings {
            file_max: 256,
            ..LogSettings::default()
        },
        ..EngineConfig::default()
    };

    {
        let conn = Connection::open(temp_dir.path(), &config).unwrap();
        TableAccessor::create(&conn, "collection-1").unwrap();
        insert_rows(&conn, "collection-1", 0..10);
        checkpoint(&conn);
        conn.close().unwrap();
    }
    {
        let conn = Connection::open(temp_dir.path(), &config).unwrap();
        insert_rows(&conn, "collection-1", 10..20);
        conn.close().unwrap();
    }

    let conn = open_readonly(temp_dir.path());
    let records = stream_all(&conn, &Catalog::default());

    let puts = records.iter().filter(|r| r.op_type == OpType::RowPut).count();
    assert_eq!(puts, 20);
    let files: std::collections::BTreeSet<u32> = records.iter().map(|r| r.lsn.file).collect();
    assert!(files.len() > 2, "expected rotation, got files {:?}", files);

    for pair in records.windows(2) {
        assert!(pair[0].lsn <= pair[1].lsn, "{} after {}", pair[1].lsn, pair[0].lsn);
        assert!(pair[0].txn_id < pair[1].txn_id);
    }
}

// =============================================================================
// Classification
// =============================================================================

#[test]
fn test_non_data_operations_are_unknown() {
    let temp_dir = create_temp_data_dir();
    let conn = open_rw(temp_dir.path());
    TableAccessor::create(&conn, "collection-1").unwrap();
    insert_rows(&conn, "collection-1", 0..2);
    checkpoint(&conn);
    TableAccessor::drop(&conn, "collection-1").unwrap();

    let records = stream_all(&conn, &Catalog::default());
    let non_data: Vec<&LogRecord> = records.iter().filter(|r| r.is_non_data()).collect();

    assert!(non_data.iter().any(|r| r.op_type == OpType::TableCreate));
    assert!(non_data.iter().any(|r| r.op_type == OpType::TableDrop));
    assert!(non_data
        .iter()
        .any(|r| r.record_type == RecordType::Checkpoint && r.file_id == 2));
    for record in non_data {
        assert_eq!(record.decoded, Decoded::Unknown, "{:?}", record);
    }

    let documents = records
        .iter()
        .filter(|r| matches!(r.decoded, Decoded::Document(_)))
        .count();
    assert_eq!(documents, 2);
}

#[test]
fn test_index_puts_and_removes_decode() {
    let temp_dir = create_temp_data_dir();
    let conn = open_rw(temp_dir.path());
    let entry = create_indexed_collection(&conn, "db.users", "collection-1", &[("age_1", KeyPattern::ascending(&["age"]))]);
    let age_index = entry.index("age_1").unwrap().clone();

    let mut index = TableAccessor::open(&conn, &age_index.identity, Kind::Index(age_index.key_pattern.clone()), native()).unwrap();
    let keys = index.index_document(&doc! { "age": 30 }, 5).unwrap();
    index.delete_raw(&keys.entries[0].0).unwrap();
    index.close().unwrap();

    let catalog = CatalogResolver::new(&conn).load().unwrap();
    let records: Vec<LogRecord> = stream_all(&conn, &catalog)
        .into_iter()
        .filter(|r| r.identity.as_deref() == Some(age_index.identity.as_str()))
        .collect();
    assert_eq!(records.len(), 2);

    for record in &records {
        match &record.decoded {
            Decoded::Index { namespace, index, entry } => {
                assert_eq!(namespace, "db.users");
                assert_eq!(index, "age_1");
                assert_eq!(entry.record_id, 5);
                // Removes carry no type bits; integers widen to Int64
                let age = entry.key.get("age").unwrap();
                assert_eq!(age.as_i64().or(age.as_i32().map(i64::from)), Some(30));
            }
            other => panic!("expected index decode, got {:?}", other),
        }
    }
    assert_eq!(records[0].op_type, OpType::RowPut);
    assert_eq!(records[1].op_type, OpType::RowRemove);
}

#[test]
fn test_index_operations_without_catalog_are_unknown() {
    let temp_dir = create_temp_data_dir();
    let conn = open_rw(temp_dir.path());
    TableAccessor::create_index_table(&conn, "index-1").unwrap();

    let pattern = KeyPattern::ascending(&["a"]);
    let mut index = TableAccessor::open(&conn, "index-1", Kind::Index(pattern), native()).unwrap();
    index.index_document(&doc! { "a": "x" }, 1).unwrap();
    index.close().unwrap();

    let records = stream_all(&conn, &Catalog::default());
    let put = records.iter().find(|r| r.op_type == OpType::RowPut).unwrap();
    assert_eq!(put.identity.as_deref(), Some("index-1"));
    assert_eq!(put.decoded, Decoded::Unknown);
}

#[test]
fn test_last_transaction_skips_trailing_checkpoint() {
    let temp_dir = create_temp_data_dir();
    let conn = open_rw(temp_dir.path());
    TableAccessor::create(&conn, "collection-1").unwrap();
    insert_rows(&conn, "collection-1", 0..3);
    checkpoint(&conn);

    let mut reader = LogReader::open(&conn, &Catalog::default(), native()).unwrap();
    let last = reader.last_transaction().unwrap();
    reader.close().unwrap();

    assert_eq!(last.len(), 1);
    assert_eq!(last[0].decoded, Decoded::Document(doc! { "n": 2i64 }));
}

// =============================================================================
// Corruption
// =============================================================================

#[test]
fn test_corrupt_frame_is_reported_once() {
    let temp_dir = create_temp_data_dir();
    {
        let conn = open_rw(temp_dir.path());
        TableAccessor::create(&conn, "collection-1").unwrap();
        insert_rows(&conn, "collection-1", 0..4);
        checkpoint(&conn);
        conn.close().unwrap();
    }

    let log_file = temp_dir.path().join("journal").join("log.0000000001");
    let mut bytes = fs::read(&log_file).unwrap();
    let last = bytes.len() - 6;
    bytes[last] ^= 0xFF;
    fs::write(&log_file, bytes).unwrap();

    let conn = open_readonly(temp_dir.path());
    let mut reader = LogReader::open(&conn, &Catalog::default(), native()).unwrap();
    let items: Vec<_> = reader.stream().collect();
    reader.close().unwrap();

    let errors: Vec<_> = items.iter().filter_map(|item| item.as_ref().err()).collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].is_engine());
    assert!(items.last().unwrap().is_err());
    assert!(items.iter().filter(|item| item.is_ok()).count() >= 4);
}
