//! Decoded table contents

use std::fmt;

use bson::Document;

use crate::engine::{LogEntry, TableMetadata};
use crate::keystring::{KeyPattern, KeyString};

/// What a physical table holds, and therefore how its bytes decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    /// Record id keys, BSON document values
    Collection,
    /// KeyString keys decoded with the index's pattern
    Index(KeyPattern),
    /// The catalog table (decodes like a collection)
    Catalog,
    /// The engine log
    Log,
    /// The engine metadata namespace
    Metadata,
    /// Engine statistics; an empty identity selects connection-wide values
    Statistics,
}

impl Kind {
    pub fn name(&self) -> &'static str {
        match self {
            Kind::Collection => "collection",
            Kind::Index(_) => "index",
            Kind::Catalog => "catalog",
            Kind::Log => "log",
            Kind::Metadata => "metadata",
            Kind::Statistics => "statistics",
        }
    }

    /// Kinds whose values are BSON documents under record id keys
    pub fn holds_documents(&self) -> bool {
        matches!(self, Kind::Collection | Kind::Catalog)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A collection (or catalog) entry
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: i64,
    pub document: Document,
}

/// One index key with every record that carries it
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub key: KeyString,
    pub record_ids: Vec<i64>,
}

/// One item produced by [`super::TableAccessor::scan_all`]
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Record(Record),
    Index(IndexEntry),
    Metadata { uri: String, meta: TableMetadata },
    Statistic { name: String, value: i64 },
    Log(LogEntry),
}
