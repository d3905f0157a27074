//! Table Access Tests
//!
//! - newKey is max + 1, or 0 for an empty table
//! - Documents round-trip through insert and get_by_key
//! - Equal index keys accumulate their record ids
//! - Bad entries surface as errors without ending a scan
//! - Resource and readonly rules of the engine

mod common;

use bson::spec::BinarySubtype;
use bson::{doc, Binary, Bson, DateTime};
use common::*;
use storescope::engine::encode_record_key;
use storescope::keystring::{encode_index_keys, KeyPattern, KeyString};
use storescope::table::{Entry, IndexEntry, Kind, Record, TableAccessor};

fn records(accessor: &mut TableAccessor) -> Vec<Record> {
    accessor
        .scan_all()
        .map(|item| match item.unwrap() {
            Entry::Record(record) => record,
            other => panic!("expected record, got {:?}", other),
        })
        .collect()
}

// =============================================================================
// newKey
// =============================================================================

#[test]
fn test_new_key_on_empty_table_is_zero() {
    let temp_dir = create_temp_data_dir();
    let conn = open_rw(temp_dir.path());
    TableAccessor::create(&conn, "collection-1").unwrap();

    let mut table = TableAccessor::open(&conn, "collection-1", Kind::Collection, native()).unwrap();
    assert_eq!(table.new_key().unwrap(), 0);
}

#[test]
fn test_new_key_after_zero_one_two_is_three() {
    let temp_dir = create_temp_data_dir();
    let conn = open_rw(temp_dir.path());
    TableAccessor::create(&conn, "collection-1").unwrap();

    let mut table = TableAccessor::open(&conn, "collection-1", Kind::Collection, native()).unwrap();
    for key in [2, 0, 1] {
        table.insert(key, &doc! { "k": key }).unwrap();
    }
    assert_eq!(table.new_key().unwrap(), 3);

    // Scan order is key order regardless of insert order
    let keys: Vec<i64> = records(&mut table).iter().map(|r| r.key).collect();
    assert_eq!(keys, vec![0, 1, 2]);
}

// =============================================================================
// Round-trip
// =============================================================================

#[test]
fn test_documents_round_trip() {
    let temp_dir = create_temp_data_dir();
    let conn = open_rw(temp_dir.path());
    TableAccessor::create(&conn, "collection-1").unwrap();

    let blob = Binary {
        subtype: BinarySubtype::Generic,
        bytes: vec![0, 1, 2, 255],
    };
    let documents = vec![
        doc! {},
        doc! { "empty": {} },
        doc! { "a": { "b": { "c": [1, 2, { "d": null }] } } },
        doc! { "blob": blob, "when": DateTime::from_millis(1_700_000_000_000), "big": 1i64 << 40 },
        doc! { "mixed": [Bson::Double(1.5), Bson::Boolean(false), Bson::String("x".into())] },
    ];

    let mut table = TableAccessor::open(&conn, "collection-1", Kind::Collection, native()).unwrap();
    for (key, document) in documents.iter().enumerate() {
        table.insert(key as i64, document).unwrap();
    }
    for (key, document) in documents.iter().enumerate() {
        assert_eq!(&table.get_by_key(key as i64).unwrap(), document);
    }
    table.close().unwrap();

    // And again after a checkpoint and reopen
    checkpoint(&conn);
    conn.close().unwrap();
    let conn = open_readonly(temp_dir.path());
    let mut table = TableAccessor::open(&conn, "collection-1", Kind::Collection, native()).unwrap();
    let scanned: Vec<_> = records(&mut table).into_iter().map(|r| r.document).collect();
    assert_eq!(scanned, documents);
}

#[test]
fn test_missing_keys_are_not_found() {
    let temp_dir = create_temp_data_dir();
    let conn = open_rw(temp_dir.path());
    TableAccessor::create(&conn, "collection-1").unwrap();

    let mut table = TableAccessor::open(&conn, "collection-1", Kind::Collection, native()).unwrap();
    assert!(table.get_by_key(7).unwrap_err().is_not_found());
    assert!(table.delete(7).unwrap_err().is_not_found());

    table.insert(7, &doc! { "a": 1 }).unwrap();
    table.delete(7).unwrap();
    assert!(table.get_by_key(7).unwrap_err().is_not_found());
}

// =============================================================================
// Index Tables
// =============================================================================

#[test]
fn test_non_unique_index_accumulates_record_ids() {
    let temp_dir = create_temp_data_dir();
    let conn = open_rw(temp_dir.path());
    TableAccessor::create_index_table(&conn, "index-1").unwrap();

    let pattern = KeyPattern::ascending(&["city"]);
    let mut index = TableAccessor::open(&conn, "index-1", Kind::Index(pattern.clone()), native()).unwrap();
    index.index_document(&doc! { "city": "Oslo" }, 4).unwrap();
    index.index_document(&doc! { "city": "Bergen" }, 2).unwrap();
    index.index_document(&doc! { "city": "Oslo" }, 9).unwrap();

    let entries: Vec<IndexEntry> = index
        .scan_all()
        .map(|item| match item.unwrap() {
            Entry::Index(entry) => entry,
            other => panic!("expected index entry, got {:?}", other),
        })
        .collect();

    assert_eq!(
        entries,
        vec![
            IndexEntry {
                key: KeyString::new(vec![("city".to_string(), Bson::String("Bergen".into()))]),
                record_ids: vec![2],
            },
            IndexEntry {
                key: KeyString::new(vec![("city".to_string(), Bson::String("Oslo".into()))]),
                record_ids: vec![4, 9],
            },
        ]
    );
}

#[test]
fn test_nan_keys_collect_into_one_entry() {
    let temp_dir = create_temp_data_dir();
    let conn = open_rw(temp_dir.path());
    TableAccessor::create_index_table(&conn, "index-1").unwrap();

    let pattern = KeyPattern::ascending(&["score"]);
    let mut index = TableAccessor::open(&conn, "index-1", Kind::Index(pattern), native()).unwrap();
    index.index_document(&doc! { "score": f64::NAN }, 3).unwrap();
    index.index_document(&doc! { "score": f64::NAN }, 7).unwrap();
    index.index_document(&doc! { "score": 1.5 }, 5).unwrap();

    let entries: Vec<IndexEntry> = index
        .scan_all()
        .map(|item| match item.unwrap() {
            Entry::Index(entry) => entry,
            other => panic!("expected index entry, got {:?}", other),
        })
        .collect();

    assert_eq!(entries.len(), 2);
    assert!(matches!(entries[0].key.get("score"), Some(Bson::Double(v)) if v.is_nan()));
    assert_eq!(entries[0].record_ids, vec![3, 7]);
    assert_eq!(entries[1].record_ids, vec![5]);
}

#[test]
fn test_bad_index_entry_does_not_end_scan() {
    let temp_dir = create_temp_data_dir();
    let conn = open_rw(temp_dir.path());
    TableAccessor::create_index_table(&conn, "index-1").unwrap();

    let pattern = KeyPattern::ascending(&["n"]);
    let mut index = TableAccessor::open(&conn, "index-1", Kind::Index(pattern.clone()), native()).unwrap();
    index.index_document(&doc! { "n": 1 }, 1).unwrap();
    index.index_document(&doc! { "n": 3 }, 3).unwrap();

    // An unknown type tag just above the numeric one sorts last
    let valid = encode_index_keys(&doc! { "n": 2 }, &pattern, 2).unwrap();
    let (mut key, value) = valid.entries[0].clone();
    key[0] += 1;
    index.insert_raw(&key, &value).unwrap();

    let items: Vec<_> = index.scan_all().collect();
    assert_eq!(items.len(), 3);
    let ids: Vec<Vec<i64>> = items[..2]
        .iter()
        .map(|item| match item {
            Ok(Entry::Index(entry)) => entry.record_ids.clone(),
            other => panic!("expected index entry, got {:?}", other),
        })
        .collect();
    assert_eq!(ids, vec![vec![1], vec![3]]);
    assert!(items[2].as_ref().unwrap_err().is_decode());
}

#[test]
fn test_document_operations_rejected_on_index_tables() {
    let temp_dir = create_temp_data_dir();
    let conn = open_rw(temp_dir.path());
    TableAccessor::create_index_table(&conn, "index-1").unwrap();

    let mut index = TableAccessor::open(&conn, "index-1", Kind::Index(KeyPattern::id()), native()).unwrap();
    assert!(index.insert(0, &doc! {}).unwrap_err().is_engine());
    assert!(index.new_key().unwrap_err().is_engine());
}

// =============================================================================
// Engine Rules
// =============================================================================

#[test]
fn test_open_missing_table_is_engine_error() {
    let temp_dir = create_temp_data_dir();
    let conn = open_rw(temp_dir.path());
    let err = TableAccessor::open(&conn, "collection-404", Kind::Collection, native())
        .err()
        .unwrap();
    assert!(err.is_engine());
    assert!(err.is_fatal());
}

#[test]
fn test_drop_with_open_cursor_fails() {
    let temp_dir = create_temp_data_dir();
    let conn = open_rw(temp_dir.path());
    TableAccessor::create(&conn, "collection-1").unwrap();

    let table = TableAccessor::open(&conn, "collection-1", Kind::Collection, native()).unwrap();
    assert!(TableAccessor::drop(&conn, "collection-1").unwrap_err().is_engine());

    table.close().unwrap();
    TableAccessor::drop(&conn, "collection-1").unwrap();
}

#[test]
fn test_connection_close_with_open_accessor_fails() {
    let temp_dir = create_temp_data_dir();
    let conn = open_rw(temp_dir.path());
    TableAccessor::create(&conn, "collection-1").unwrap();

    let table = TableAccessor::open(&conn, "collection-1", Kind::Collection, native()).unwrap();
    assert!(conn.close().unwrap_err().is_resource());

    drop(table);
    conn.close().unwrap();
    assert!(conn.open_session().err().unwrap().is_resource());
}

#[test]
fn test_readonly_rejects_mutation() {
    let temp_dir = create_temp_data_dir();
    {
        let conn = open_rw(temp_dir.path());
        TableAccessor::create(&conn, "collection-1").unwrap();
        checkpoint(&conn);
        conn.close().unwrap();
    }

    let conn = open_readonly(temp_dir.path());
    let mut table = TableAccessor::open(&conn, "collection-1", Kind::Collection, native()).unwrap();
    assert!(table.insert(0, &doc! { "a": 1 }).unwrap_err().is_engine());
    assert!(table
        .insert_raw(&encode_record_key(1), b"")
        .unwrap_err()
        .is_engine());
    assert!(TableAccessor::create(&conn, "collection-2").unwrap_err().is_engine());
}

#[test]
fn test_statistics_reflect_inserts() {
    let temp_dir = create_temp_data_dir();
    let conn = open_rw(temp_dir.path());
    TableAccessor::create(&conn, "collection-1").unwrap();

    let mut table = TableAccessor::open(&conn, "collection-1", Kind::Collection, native()).unwrap();
    table.insert(0, &doc! { "a": 1 }).unwrap();
    table.insert(1, &doc! { "a": 2 }).unwrap();
    table.close().unwrap();

    let mut stats = TableAccessor::open(&conn, "collection-1", Kind::Statistics, native()).unwrap();
    let values: Vec<(String, i64)> = stats
        .scan_all()
        .map(|item| match item.unwrap() {
            Entry::Statistic { name, value } => (name, value),
            other => panic!("expected statistic, got {:?}", other),
        })
        .collect();
    assert!(values.contains(&("btree: row-store entries".to_string(), 2)));
    assert!(values.contains(&("cursor: insert calls".to_string(), 2)));
}
