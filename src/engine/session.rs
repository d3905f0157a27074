//! Sessions: the unit through which cursors are opened and tables are
//! created, dropped and checkpointed

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard};

use super::connection::{EngineState, Shared, TableState, METADATA_FILE};
use super::cursor::{LogCursor, MetadataCursor, StatisticsCursor, TableCursor};
use super::log::{list_log_files, LogOp, Lsn, OpType, RecordType};
use super::metadata::{
    validate_ident, KeyFormat, TableMetadata, CHECKPOINT_FILE_ID, METADATA_FILE_ID,
};
use super::stats::{connection_statistics, table_statistics, ConnectionSnapshot, TableStats};
use super::table_file::{write_table_file, Rows};
use crate::errors::{InspectError, InspectResult};

/// Outcome of a checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointSummary {
    pub tables_written: usize,
    /// Position of the checkpoint record, `None` when logging is disabled
    pub lsn: Option<Lsn>,
}

pub(crate) struct SessionInner {
    pub shared: Arc<Shared>,
    id: u64,
    closed: AtomicBool,
}

impl SessionInner {
    pub(crate) fn new(shared: Arc<Shared>, id: u64) -> Self {
        Self {
            shared,
            id,
            closed: AtomicBool::new(false),
        }
    }

    /// Locks engine state, failing if this session or the connection has
    /// been closed
    pub(crate) fn state(&self) -> InspectResult<MutexGuard<'_, EngineState>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(InspectError::resource("session is closed")
                .with_details(format!("session {}", self.id)));
        }
        let state = self.shared.lock()?;
        if state.closed {
            return Err(InspectError::resource("connection is closed"));
        }
        Ok(state)
    }

    fn release(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Ok(mut state) = self.shared.state.lock() {
            state.open_sessions = state.open_sessions.saturating_sub(1);
        }
    }
}

/// An engine session. Closing (or dropping) it invalidates every cursor
/// opened through it.
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub(crate) fn new(inner: Arc<SessionInner>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn close(self) -> InspectResult<()> {
        self.inner.release();
        Ok(())
    }

    pub fn table_exists(&self, ident: &str) -> InspectResult<bool> {
        Ok(self.inner.state()?.tables.contains_key(ident))
    }

    pub fn table_metadata(&self, ident: &str) -> InspectResult<TableMetadata> {
        Ok(self.inner.state()?.table(ident)?.meta.clone())
    }

    /// Opens an ordered cursor over a table
    pub fn open_table_cursor(&self, ident: &str) -> InspectResult<TableCursor> {
        let mut state = self.inner.state()?;
        let table = state.table_mut(ident)?;
        table.open_cursors += 1;
        let key_format = table.meta.key_format;
        drop(state);
        Ok(TableCursor::new(
            Arc::clone(&self.inner),
            ident.to_string(),
            key_format,
        ))
    }

    /// Opens a cursor over the metadata namespace
    pub fn open_metadata_cursor(&self) -> InspectResult<MetadataCursor> {
        let state = self.inner.state()?;
        let entries = state.tables.values().map(|t| t.meta.clone()).collect();
        drop(state);
        Ok(MetadataCursor::new(Arc::clone(&self.inner), entries))
    }

    /// Opens a cursor over every log file, oldest first
    pub fn open_log_cursor(&self) -> InspectResult<LogCursor> {
        drop(self.inner.state()?);
        let files = list_log_files(&self.inner.shared.log_dir)?;
        Ok(LogCursor::new(Arc::clone(&self.inner), files))
    }

    /// Opens a statistics cursor over the connection, or one table
    pub fn open_statistics_cursor(&self, ident: Option<&str>) -> InspectResult<StatisticsCursor> {
        let state = self.inner.state()?;
        let values = match ident {
            Some(ident) => {
                let table = state.table(ident)?;
                let key_bytes = table.rows.keys().map(Vec::len).sum();
                let value_bytes = table.rows.values().map(Vec::len).sum();
                table_statistics(&table.stats, table.rows.len(), key_bytes, value_bytes)
            }
            None => connection_statistics(ConnectionSnapshot {
                stats: &state.stats,
                open_sessions: state.open_sessions,
                tables: state.tables.len(),
                log_records_written: state.log.as_ref().map_or(0, |l| l.records_written()),
                log_bytes_written: state.log.as_ref().map_or(0, |l| l.bytes_written()),
            }),
        };
        drop(state);
        Ok(StatisticsCursor::new(Arc::clone(&self.inner), values))
    }

    /// Creates an empty table
    pub fn create_table(&self, ident: &str, key_format: KeyFormat) -> InspectResult<TableMetadata> {
        validate_ident(ident)?;
        self.inner.shared.ensure_writable()?;
        let mut state = self.inner.state()?;
        if state.tables.contains_key(ident) {
            return Err(InspectError::engine("table already exists").with_details(ident.to_string()));
        }

        let meta = TableMetadata::new(ident, state.next_file_id, key_format);
        state.log_ops(
            RecordType::Commit,
            vec![LogOp {
                op_type: OpType::TableCreate,
                file_id: METADATA_FILE_ID,
                key: meta.uri().into_bytes(),
                value: meta.config().as_bytes().to_vec(),
            }],
        )?;

        state.next_file_id += 1;
        state.dropped.remove(ident);
        state.tables.insert(
            ident.to_string(),
            TableState {
                meta: meta.clone(),
                rows: Rows::new(),
                dirty: true,
                open_cursors: 0,
                stats: TableStats::default(),
            },
        );
        Ok(meta)
    }

    /// Drops a table. Fails while any cursor on it is open.
    pub fn drop_table(&self, ident: &str) -> InspectResult<()> {
        self.inner.shared.ensure_writable()?;
        let mut state = self.inner.state()?;
        let table = state.table(ident)?;
        if table.open_cursors > 0 {
            return Err(InspectError::engine("table has open cursors")
                .with_details(format!("{}: {} open", ident, table.open_cursors)));
        }
        let uri = table.meta.uri();

        state.log_ops(
            RecordType::Commit,
            vec![LogOp {
                op_type: OpType::TableDrop,
                file_id: METADATA_FILE_ID,
                key: uri.into_bytes(),
                value: Vec::new(),
            }],
        )?;
        state.tables.remove(ident);
        state.dropped.insert(ident.to_string());
        Ok(())
    }

    /// Makes every mutation so far durable
    ///
    /// Dirty tables and then the metadata table are rewritten atomically.
    /// Files of dropped tables are removed after the metadata, and a
    /// checkpoint record is appended to the log last.
    pub fn checkpoint(&self) -> InspectResult<CheckpointSummary> {
        self.inner.shared.ensure_writable()?;
        let data_dir = self.inner.shared.data_dir.clone();
        let mut state = self.inner.state()?;

        let mut tables_written = 0;
        for table in state.tables.values_mut().filter(|t| t.dirty) {
            let size = write_table_file(&data_dir.join(table.meta.file_name()), &table.rows)?;
            table.dirty = false;
            table.stats.checkpoint_writes += 1;
            table.stats.file_size = size;
            tables_written += 1;
        }

        let metadata: Rows = state
            .tables
            .values()
            .map(|t| (t.meta.uri().into_bytes(), t.meta.config().as_bytes().to_vec()))
            .collect::<BTreeMap<_, _>>();
        write_table_file(&data_dir.join(METADATA_FILE), &metadata)?;
        sync_dir(&data_dir)?;

        // Dropped files go only once the metadata no longer names them
        for ident in std::mem::take(&mut state.dropped) {
            let path = data_dir.join(format!("{}.tbl", ident));
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(InspectError::engine_io("failed to remove dropped table", e)
                        .with_details(path.display().to_string()))
                }
            }
        }

        let lsn = state.log_ops(
            RecordType::Checkpoint,
            vec![LogOp {
                op_type: OpType::Checkpoint,
                file_id: CHECKPOINT_FILE_ID,
                key: Vec::new(),
                value: tables_written.to_string().into_bytes(),
            }],
        )?;
        state.stats.checkpoints += 1;
        state.stats.checkpoint_tables_written += tables_written as u64;

        Ok(CheckpointSummary {
            tables_written,
            lsn,
        })
    }
}

/// Makes the renames of a checkpoint durable
fn sync_dir(dir: &Path) -> InspectResult<()> {
    let handle = File::open(dir).map_err(|e| {
        InspectError::engine_io("failed to open data directory for fsync", e)
            .with_details(dir.display().to_string())
    })?;
    handle.sync_all().map_err(|e| {
        InspectError::engine_io("failed to fsync data directory", e)
            .with_details(dir.display().to_string())
    })
}

impl Drop for Session {
    fn drop(&mut self) {
        self.inner.release();
    }
}
