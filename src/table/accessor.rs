//! TableAccessor: one interface over every physical table family
//!
//! An accessor owns its own session and exactly one cursor, chosen by
//! [`Kind`]. Both are released when the accessor is dropped, on every path.

use std::sync::Arc;

use bson::Document;

use super::document::{decode_document, encode_document};
use super::entry::{Entry, IndexEntry, Kind, Record};
use crate::engine::{
    decode_record_key, encode_record_key, Connection, KeyFormat, LogCursor, MetadataCursor,
    Session, StatisticsCursor, TableCursor,
};
use crate::errors::{InspectError, InspectResult};
use crate::keystring::{encode_index_keys, IndexKeys, KeyCodec, KeyPattern};
use crate::observability::{log_event_with_fields, Event};

/// Width of the record id trailing every non-`_id` index key
const RECORD_ID_LEN: usize = 8;

enum CursorHandle {
    Table(TableCursor),
    Metadata(MetadataCursor),
    Log(LogCursor),
    Statistics(StatisticsCursor),
}

/// Scoped access to one physical table
pub struct TableAccessor {
    // Declared before `session` so the cursor is released first
    cursor: CursorHandle,
    session: Session,
    identity: String,
    kind: Kind,
    codec: Arc<dyn KeyCodec>,
}

impl TableAccessor {
    /// Opens a session and a cursor of the family `kind` selects
    ///
    /// `identity` names the table for Collection, Index and Catalog kinds,
    /// and an optional table for Statistics. Log and Metadata ignore it.
    pub fn open(
        conn: &Connection,
        identity: &str,
        kind: Kind,
        codec: Arc<dyn KeyCodec>,
    ) -> InspectResult<Self> {
        let session = conn.open_session()?;
        let cursor = match &kind {
            Kind::Collection | Kind::Index(_) | Kind::Catalog => {
                CursorHandle::Table(session.open_table_cursor(identity)?)
            }
            Kind::Metadata => CursorHandle::Metadata(session.open_metadata_cursor()?),
            Kind::Log => CursorHandle::Log(session.open_log_cursor()?),
            Kind::Statistics => {
                let target = Some(identity).filter(|ident| !ident.is_empty());
                CursorHandle::Statistics(session.open_statistics_cursor(target)?)
            }
        };

        Ok(Self {
            cursor,
            session,
            identity: identity.to_string(),
            kind,
            codec,
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    /// Releases the cursor and the session
    pub fn close(self) -> InspectResult<()> {
        let Self { cursor, session, .. } = self;
        drop(cursor);
        session.close()
    }

    /// Scans the table from the start in physical key order
    ///
    /// Entries that fail to decode surface as `Err` items and the scan
    /// continues. Engine and resource errors end the scan.
    pub fn scan_all(&mut self) -> Scan<'_> {
        if let CursorHandle::Table(cursor) = &mut self.cursor {
            cursor.reset();
        }
        Scan {
            accessor: self,
            pending: None,
            pending_prefix: Vec::new(),
            deferred: None,
            done: false,
        }
    }

    /// Point lookup of a document by record id
    pub fn get_by_key(&mut self, key: i64) -> InspectResult<Document> {
        self.require_documents("get_by_key")?;
        let value = self.get_raw(&encode_record_key(key))?;
        decode_document(&value)
            .map_err(|e| e.with_details(format!("{} key {}", self.identity, key)))
    }

    /// Point lookup of raw value bytes
    pub fn get_raw(&mut self, key: &[u8]) -> InspectResult<Vec<u8>> {
        let identity = self.identity.clone();
        self.table_cursor()?.search(key)?.ok_or_else(|| {
            InspectError::not_found("key not found")
                .with_details(format!("{}: {}", identity, hex::encode(key)))
        })
    }

    /// Inserts (or overwrites) a document under a record id
    pub fn insert(&mut self, key: i64, document: &Document) -> InspectResult<()> {
        self.require_documents("insert")?;
        let value = encode_document(document)?;
        self.insert_raw(&encode_record_key(key), &value)?;
        log_event_with_fields(
            Event::RecordInserted,
            &[("ident", &self.identity), ("key", &key.to_string())],
        );
        Ok(())
    }

    /// Inserts raw key/value bytes
    pub fn insert_raw(&mut self, key: &[u8], value: &[u8]) -> InspectResult<()> {
        self.table_cursor()?.insert(key, value)
    }

    /// Deletes a record; a missing key is a not-found error
    pub fn delete(&mut self, key: i64) -> InspectResult<()> {
        self.require_documents("delete")?;
        self.delete_raw(&encode_record_key(key))?;
        log_event_with_fields(
            Event::RecordDeleted,
            &[("ident", &self.identity), ("key", &key.to_string())],
        );
        Ok(())
    }

    pub fn delete_raw(&mut self, key: &[u8]) -> InspectResult<()> {
        self.table_cursor()?.remove(key)
    }

    /// Returns one past the largest record id, or 0 for an empty table
    ///
    /// This scans the whole table. Two writers calling it concurrently can
    /// receive the same key.
    pub fn new_key(&mut self) -> InspectResult<i64> {
        self.require_documents("new_key")?;
        let identity = self.identity.clone();
        let cursor = self.table_cursor()?;
        cursor.reset();

        let mut max: Option<i64> = None;
        while let Some((raw, _)) = cursor.next_entry()? {
            let key = decode_record_key(&raw).ok_or_else(|| {
                InspectError::decode("record key is not 8 bytes")
                    .with_details(format!("{}: {}", identity, hex::encode(&raw)))
            })?;
            max = Some(max.map_or(key, |m| m.max(key)));
        }
        cursor.reset();
        Ok(max.map_or(0, |m| m + 1))
    }

    /// Writes every index entry `document` produces under this index's
    /// pattern for record `record_id`
    pub fn index_document(&mut self, document: &Document, record_id: i64) -> InspectResult<IndexKeys> {
        let Kind::Index(pattern) = &self.kind else {
            return Err(self.unsupported("index_document"));
        };
        let keys = encode_index_keys(document, pattern, record_id)?;
        for (key, value) in &keys.entries {
            self.insert_raw(key, value)?;
        }
        Ok(keys)
    }

    /// Creates an empty collection table
    pub fn create(conn: &Connection, identity: &str) -> InspectResult<()> {
        Self::create_table(conn, identity, KeyFormat::Record)
    }

    /// Creates an empty index table
    pub fn create_index_table(conn: &Connection, identity: &str) -> InspectResult<()> {
        Self::create_table(conn, identity, KeyFormat::Raw)
    }

    fn create_table(conn: &Connection, identity: &str, format: KeyFormat) -> InspectResult<()> {
        let session = conn.open_session()?;
        let meta = session.create_table(identity, format)?;
        session.close()?;
        log_event_with_fields(
            Event::TableCreated,
            &[
                ("file_id", &meta.file_id.to_string()),
                ("ident", identity),
                ("key_format", format.as_config()),
            ],
        );
        Ok(())
    }

    /// Drops a table; fails while any cursor on it is open
    pub fn drop(conn: &Connection, identity: &str) -> InspectResult<()> {
        let session = conn.open_session()?;
        session.drop_table(identity)?;
        session.close()?;
        log_event_with_fields(Event::TableDropped, &[("ident", identity)]);
        Ok(())
    }

    fn table_cursor(&mut self) -> InspectResult<&mut TableCursor> {
        match &mut self.cursor {
            CursorHandle::Table(cursor) => Ok(cursor),
            _ => Err(InspectError::engine("operation needs a table cursor")
                .with_details(format!("{} is a {} accessor", self.identity, self.kind))),
        }
    }

    fn require_documents(&self, operation: &str) -> InspectResult<()> {
        if self.kind.holds_documents() {
            Ok(())
        } else {
            Err(self.unsupported(operation))
        }
    }

    fn unsupported(&self, operation: &str) -> InspectError {
        InspectError::engine(format!("{} is not supported on {} tables", operation, self.kind))
            .with_details(self.identity.clone())
    }

    fn decode_record(&self, raw_key: &[u8], raw_value: &[u8]) -> InspectResult<Record> {
        let key = decode_record_key(raw_key).ok_or_else(|| {
            InspectError::decode("record key is not 8 bytes")
                .with_details(format!("{}: {}", self.identity, hex::encode(raw_key)))
        })?;
        let document = decode_document(raw_value)
            .map_err(|e| e.with_details(format!("{} key {}", self.identity, key)))?;
        Ok(Record { key, document })
    }
}

/// Lazy scan produced by [`TableAccessor::scan_all`]
pub struct Scan<'a> {
    accessor: &'a mut TableAccessor,
    /// Index entry still collecting record ids
    pending: Option<IndexEntry>,
    /// Raw key bytes of `pending`, without the record id
    pending_prefix: Vec<u8>,
    /// Decode error to report after `pending` has been emitted
    deferred: Option<InspectError>,
    done: bool,
}

impl Scan<'_> {
    fn next_index_entry(&mut self, pattern: &KeyPattern) -> Option<InspectResult<Entry>> {
        loop {
            let raw = match &mut self.accessor.cursor {
                CursorHandle::Table(cursor) => cursor.next_entry(),
                _ => Ok(None),
            };
            let (key, value) = match raw {
                Ok(Some(pair)) => pair,
                Ok(None) => {
                    self.done = true;
                    return self.pending.take().map(|entry| Ok(Entry::Index(entry)));
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };

            let decoded = match self.accessor.codec.decode(&key, &value, pattern) {
                Ok(decoded) => decoded,
                Err(e) => {
                    let e = e.with_details(format!(
                        "{}: {}",
                        self.accessor.identity,
                        hex::encode(&key)
                    ));
                    return match self.pending.take() {
                        Some(entry) => {
                            self.deferred = Some(e);
                            Some(Ok(Entry::Index(entry)))
                        }
                        None => Some(Err(e)),
                    };
                }
            };

            // Grouped on key bytes, so keys that compare unequal as values
            // (NaN) still collect into one entry
            let prefix = key_prefix(&key, pattern);
            match &mut self.pending {
                Some(entry) if self.pending_prefix == prefix => {
                    entry.record_ids.push(decoded.record_id)
                }
                _ => {
                    self.pending_prefix = prefix.to_vec();
                    let previous = self.pending.replace(IndexEntry {
                        key: decoded.key,
                        record_ids: vec![decoded.record_id],
                    });
                    if let Some(entry) = previous {
                        return Some(Ok(Entry::Index(entry)));
                    }
                }
            }
        }
    }
}

/// Index key bytes before the record id
fn key_prefix<'k>(key: &'k [u8], pattern: &KeyPattern) -> &'k [u8] {
    if pattern.is_id_pattern() {
        key
    } else {
        &key[..key.len().saturating_sub(RECORD_ID_LEN)]
    }
}

impl Iterator for Scan<'_> {
    type Item = InspectResult<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.deferred.take() {
            return Some(Err(e));
        }
        if self.done {
            return None;
        }

        if let Kind::Index(pattern) = &self.accessor.kind {
            let pattern = pattern.clone();
            return self.next_index_entry(&pattern);
        }

        let next = match &mut self.accessor.cursor {
            CursorHandle::Table(cursor) => cursor.next_entry().map(|raw| {
                raw.map(|(key, value)| {
                    self.accessor
                        .decode_record(&key, &value)
                        .map(Entry::Record)
                })
            }),
            CursorHandle::Metadata(cursor) => cursor
                .next_entry()
                .map(|raw| raw.map(|(uri, meta)| Ok(Entry::Metadata { uri, meta }))),
            CursorHandle::Statistics(cursor) => cursor
                .next_entry()
                .map(|raw| raw.map(|(name, value)| Ok(Entry::Statistic { name, value }))),
            CursorHandle::Log(cursor) => cursor
                .next_entry()
                .map(|raw| raw.map(|entry| Ok(Entry::Log(entry)))),
        };

        match next {
            Ok(Some(item)) => Some(item),
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
