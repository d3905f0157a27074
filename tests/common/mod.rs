//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use storescope::catalog::{CatalogEntry, CatalogResolver, IndexSpec};
use storescope::checkpoint::CheckpointCoordinator;
use storescope::engine::{Connection, EngineConfig};
use storescope::keystring::{KeyCodec, KeyPattern, NativeKeyCodec};
use storescope::table::TableAccessor;
use tempfile::TempDir;

pub fn create_temp_data_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

/// Opens a read-write connection, initialising the directory and catalog
pub fn open_rw(dir: &Path) -> Connection {
    let config = EngineConfig {
        create: true,
        ..EngineConfig::default()
    };
    let conn = Connection::open(dir, &config).expect("open read-write");
    CatalogResolver::initialize(&conn).expect("initialize catalog");
    conn
}

pub fn open_readonly(dir: &Path) -> Connection {
    let config = EngineConfig {
        readonly: true,
        ..EngineConfig::default()
    };
    Connection::open(dir, &config).expect("open readonly")
}

pub fn native() -> Arc<dyn KeyCodec> {
    Arc::new(NativeKeyCodec)
}

/// Creates a collection with the given secondary indexes (plus `_id_`),
/// registering index tables in the catalog entry
pub fn create_indexed_collection(
    conn: &Connection,
    namespace: &str,
    identity: &str,
    indexes: &[(&str, KeyPattern)],
) -> CatalogEntry {
    let resolver = CatalogResolver::new(conn);
    let mut entry = resolver
        .create_collection(namespace, identity)
        .expect("create collection");

    let mut specs = vec![IndexSpec::new("_id_", KeyPattern::id(), format!("index-{}-id", identity))];
    for (name, pattern) in indexes {
        specs.push(IndexSpec::new(*name, pattern.clone(), format!("index-{}-{}", identity, name)));
    }
    for spec in &specs {
        TableAccessor::create_index_table(conn, &spec.identity).expect("create index table");
    }

    // Rewrite the catalog entry in place with its indexes
    let mut catalog = TableAccessor::open(conn, "_mdb_catalog", storescope::table::Kind::Catalog, native())
        .expect("open catalog");
    entry.indexes = specs;
    catalog
        .insert(entry.record_id, &entry.to_document())
        .expect("update catalog entry");
    catalog.close().expect("close catalog");
    entry
}

pub fn checkpoint(conn: &Connection) {
    CheckpointCoordinator::new(conn).checkpoint().expect("checkpoint");
}
