//! Cursor families
//!
//! Every cursor holds its session. Once the session or the connection is
//! closed, any further call fails with a resource error.

use std::collections::VecDeque;
use std::ops::Bound;
use std::path::PathBuf;
use std::sync::Arc;

use super::log::{LogEntry, LogFileReader, LogOp, Lsn, OpType, RecordType};
use super::metadata::{KeyFormat, TableMetadata};
use super::session::SessionInner;
use crate::errors::{InspectError, InspectResult};

/// Ordered cursor over one table
pub struct TableCursor {
    session: Arc<SessionInner>,
    ident: String,
    key_format: KeyFormat,
    /// Last key returned by `next_entry`
    position: Option<Vec<u8>>,
}

impl TableCursor {
    pub(crate) fn new(session: Arc<SessionInner>, ident: String, key_format: KeyFormat) -> Self {
        Self {
            session,
            ident,
            key_format,
            position: None,
        }
    }

    pub fn ident(&self) -> &str {
        &self.ident
    }

    pub fn key_format(&self) -> KeyFormat {
        self.key_format
    }

    /// Repositions the cursor before the first entry
    pub fn reset(&mut self) {
        self.position = None;
    }

    /// Returns the entry after the current position
    pub fn next_entry(&mut self) -> InspectResult<Option<(Vec<u8>, Vec<u8>)>> {
        let state = self.session.state()?;
        let table = state.table(&self.ident)?;
        let next = match &self.position {
            None => table.rows.iter().next(),
            Some(last) => table
                .rows
                .range::<[u8], _>((Bound::Excluded(last.as_slice()), Bound::Unbounded))
                .next(),
        }
        .map(|(k, v)| (k.clone(), v.clone()));
        drop(state);

        if let Some((key, _)) = &next {
            self.position = Some(key.clone());
        }
        Ok(next)
    }

    /// Exact-match lookup
    pub fn search(&mut self, key: &[u8]) -> InspectResult<Option<Vec<u8>>> {
        let mut state = self.session.state()?;
        state.stats.searches += 1;
        let table = state.table_mut(&self.ident)?;
        table.stats.searches += 1;
        Ok(table.rows.get(key).cloned())
    }

    /// Inserts or overwrites one entry
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> InspectResult<()> {
        self.session.shared.ensure_writable()?;
        self.check_key(key)?;
        let mut state = self.session.state()?;
        let file_id = state.table(&self.ident)?.meta.file_id;

        state.log_ops(
            RecordType::Commit,
            vec![LogOp {
                op_type: OpType::RowPut,
                file_id,
                key: key.to_vec(),
                value: value.to_vec(),
            }],
        )?;
        state.stats.inserts += 1;
        let table = state.table_mut(&self.ident)?;
        table.rows.insert(key.to_vec(), value.to_vec());
        table.dirty = true;
        table.stats.inserts += 1;
        Ok(())
    }

    /// Removes one entry; a missing key is a not-found error
    pub fn remove(&mut self, key: &[u8]) -> InspectResult<()> {
        self.session.shared.ensure_writable()?;
        let mut state = self.session.state()?;
        let table = state.table(&self.ident)?;
        if !table.rows.contains_key(key) {
            return Err(InspectError::not_found("key not found")
                .with_details(format!("{}: {}", self.ident, hex::encode(key))));
        }
        let file_id = table.meta.file_id;

        state.log_ops(
            RecordType::Commit,
            vec![LogOp {
                op_type: OpType::RowRemove,
                file_id,
                key: key.to_vec(),
                value: Vec::new(),
            }],
        )?;
        state.stats.removes += 1;
        let table = state.table_mut(&self.ident)?;
        table.rows.remove(key);
        table.dirty = true;
        table.stats.removes += 1;
        Ok(())
    }

    fn check_key(&self, key: &[u8]) -> InspectResult<()> {
        if self.key_format == KeyFormat::Record && key.len() != 8 {
            return Err(InspectError::engine("record key must be 8 bytes")
                .with_details(format!("{}: {} bytes", self.ident, key.len())));
        }
        Ok(())
    }
}

impl Drop for TableCursor {
    fn drop(&mut self) {
        if let Ok(mut state) = self.session.shared.state.lock() {
            if let Some(table) = state.tables.get_mut(&self.ident) {
                table.open_cursors = table.open_cursors.saturating_sub(1);
            }
        }
    }
}

/// Cursor over `(uri, metadata)` entries, in identity order
pub struct MetadataCursor {
    session: Arc<SessionInner>,
    entries: VecDeque<TableMetadata>,
}

impl MetadataCursor {
    pub(crate) fn new(session: Arc<SessionInner>, entries: Vec<TableMetadata>) -> Self {
        Self {
            session,
            entries: entries.into(),
        }
    }

    pub fn next_entry(&mut self) -> InspectResult<Option<(String, TableMetadata)>> {
        drop(self.session.state()?);
        Ok(self.entries.pop_front().map(|meta| (meta.uri(), meta)))
    }
}

/// Cursor over `(name, value)` statistics
pub struct StatisticsCursor {
    session: Arc<SessionInner>,
    values: VecDeque<(String, i64)>,
}

impl StatisticsCursor {
    pub(crate) fn new(session: Arc<SessionInner>, values: Vec<(String, i64)>) -> Self {
        Self {
            session,
            values: values.into(),
        }
    }

    pub fn next_entry(&mut self) -> InspectResult<Option<(String, i64)>> {
        drop(self.session.state()?);
        Ok(self.values.pop_front())
    }
}

/// Cursor over every log operation in LSN order
///
/// Files are read one at a time as the cursor reaches them. A corrupt
/// frame is reported once; the cursor then ends.
pub struct LogCursor {
    session: Arc<SessionInner>,
    files: VecDeque<(u32, PathBuf)>,
    current: Option<(u32, LogFileReader)>,
    pending: VecDeque<LogEntry>,
    failed: bool,
}

impl LogCursor {
    pub(crate) fn new(session: Arc<SessionInner>, files: Vec<(u32, PathBuf)>) -> Self {
        Self {
            session,
            files: files.into(),
            current: None,
            pending: VecDeque::new(),
            failed: false,
        }
    }

    pub fn next_entry(&mut self) -> InspectResult<Option<LogEntry>> {
        drop(self.session.state()?);
        loop {
            if let Some(entry) = self.pending.pop_front() {
                return Ok(Some(entry));
            }
            if self.failed {
                return Ok(None);
            }

            let Some((number, reader)) = self.current.as_mut() else {
                let Some((number, path)) = self.files.pop_front() else {
                    return Ok(None);
                };
                match LogFileReader::open(number, &path) {
                    Ok(reader) => self.current = Some((number, reader)),
                    Err(e) => {
                        self.failed = true;
                        return Err(e);
                    }
                }
                continue;
            };

            match reader.next_frame() {
                Ok(Some((offset, frame))) => {
                    let file = *number;
                    for (i, op) in frame.ops.into_iter().enumerate() {
                        self.pending.push_back(LogEntry {
                            lsn: Lsn::new(file, offset, i as u32),
                            txn_id: frame.txn_id,
                            record_type: frame.record_type,
                            op_type: op.op_type,
                            file_id: op.file_id,
                            key: op.key,
                            value: op.value,
                        });
                    }
                }
                Ok(None) => self.current = None,
                Err(e) => {
                    self.failed = true;
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Connection, EngineConfig};
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> Connection {
        let config = EngineConfig {
            create: true,
            ..EngineConfig::default()
        };
        Connection::open(dir.path(), &config).unwrap()
    }

    #[test]
    fn test_table_cursor_iterates_in_key_order() {
        let dir = TempDir::new().unwrap();
        let conn = open(&dir);
        let session = conn.open_session().unwrap();
        session.create_table("t", KeyFormat::Raw).unwrap();
        let mut cursor = session.open_table_cursor("t").unwrap();
        for key in [b"c", b"a", b"b"] {
            cursor.insert(key, b"v").unwrap();
        }

        let mut keys = Vec::new();
        while let Some((key, _)) = cursor.next_entry().unwrap() {
            keys.push(key);
        }
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);

        cursor.reset();
        assert_eq!(cursor.next_entry().unwrap().unwrap().0, b"a");
    }

    #[test]
    fn test_remove_missing_key_is_not_found() {
        let dir = TempDir::new().unwrap();
        let conn = open(&dir);
        let session = conn.open_session().unwrap();
        session.create_table("t", KeyFormat::Raw).unwrap();
        let mut cursor = session.open_table_cursor("t").unwrap();

        assert!(cursor.remove(b"x").unwrap_err().is_not_found());
        cursor.insert(b"x", b"1").unwrap();
        cursor.remove(b"x").unwrap();
        assert_eq!(cursor.search(b"x").unwrap(), None);
    }

    #[test]
    fn test_record_tables_require_eight_byte_keys() {
        let dir = TempDir::new().unwrap();
        let conn = open(&dir);
        let session = conn.open_session().unwrap();
        session.create_table("t", KeyFormat::Record).unwrap();
        let mut cursor = session.open_table_cursor("t").unwrap();
        assert!(cursor.insert(b"short", b"v").unwrap_err().is_engine());
        cursor.insert(&[0u8; 8], b"v").unwrap();
    }

    #[test]
    fn test_open_missing_table_is_engine_error() {
        let dir = TempDir::new().unwrap();
        let conn = open(&dir);
        let session = conn.open_session().unwrap();
        assert!(session.open_table_cursor("missing").err().unwrap().is_engine());
    }

    #[test]
    fn test_uncheckpointed_rows_are_lost_on_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let conn = open(&dir);
            let session = conn.open_session().unwrap();
            session.create_table("t", KeyFormat::Raw).unwrap();
            let mut cursor = session.open_table_cursor("t").unwrap();
            cursor.insert(b"durable", b"1").unwrap();
            session.checkpoint().unwrap();
            cursor.insert(b"volatile", b"2").unwrap();
        }
        let conn = open(&dir);
        let session = conn.open_session().unwrap();
        let mut cursor = session.open_table_cursor("t").unwrap();
        assert!(cursor.search(b"durable").unwrap().is_some());
        assert!(cursor.search(b"volatile").unwrap().is_none());
    }

    #[test]
    fn test_log_cursor_reports_all_operations() {
        let dir = TempDir::new().unwrap();
        let conn = open(&dir);
        let session = conn.open_session().unwrap();
        let meta = session.create_table("t", KeyFormat::Raw).unwrap();
        let mut cursor = session.open_table_cursor("t").unwrap();
        cursor.insert(b"k", b"v").unwrap();
        cursor.remove(b"k").unwrap();
        session.checkpoint().unwrap();

        let mut log = session.open_log_cursor().unwrap();
        let mut entries = Vec::new();
        while let Some(entry) = log.next_entry().unwrap() {
            entries.push(entry);
        }
        let ops: Vec<OpType> = entries.iter().map(|e| e.op_type).collect();
        assert_eq!(
            ops,
            vec![
                OpType::TableCreate,
                OpType::RowPut,
                OpType::RowRemove,
                OpType::Checkpoint
            ]
        );
        assert_eq!(entries[1].file_id, meta.file_id);
        assert_eq!(entries[3].record_type, RecordType::Checkpoint);
        assert!(entries.windows(2).all(|w| w[0].lsn < w[1].lsn));
    }

    #[test]
    fn test_metadata_cursor_lists_tables() {
        let dir = TempDir::new().unwrap();
        let conn = open(&dir);
        let session = conn.open_session().unwrap();
        session.create_table("b", KeyFormat::Raw).unwrap();
        session.create_table("a", KeyFormat::Record).unwrap();

        let mut cursor = session.open_metadata_cursor().unwrap();
        let (uri, meta) = cursor.next_entry().unwrap().unwrap();
        assert_eq!(uri, "table:a");
        assert_eq!(meta.key_format, KeyFormat::Record);
        assert_eq!(cursor.next_entry().unwrap().unwrap().0, "table:b");
        assert!(cursor.next_entry().unwrap().is_none());
    }
}
