//! Process-wide engine connection
//!
//! A `Connection` owns the in-memory image of every table plus the log
//! writer. All state sits behind one mutex; sessions and cursors reach it
//! through a shared `Arc`.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use super::log::{LogOp, LogWriter, Lsn, RecordType};
use super::metadata::{TableMetadata, FIRST_TABLE_FILE_ID};
use super::session::{Session, SessionInner};
use super::stats::{ConnectionStats, TableStats};
use super::table_file::{read_table_file, write_table_file, Rows};
use crate::errors::{InspectError, InspectResult};
use crate::observability::{log_event_with_fields, Event};

/// Name of the metadata table file
pub const METADATA_FILE: &str = "metadata.tbl";

/// Log settings of a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub enabled: bool,
    /// Log directory, relative to the data directory
    pub path: PathBuf,
    /// Size at which a new log file is started
    pub file_max: u64,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("journal"),
            file_max: 100 * 1024 * 1024,
        }
    }
}

/// Options for opening a connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Initialise an empty data directory if none exists
    pub create: bool,
    /// Reject every mutation and checkpoint
    pub readonly: bool,
    pub log: LogSettings,
}

pub(crate) struct TableState {
    pub meta: TableMetadata,
    pub rows: Rows,
    pub dirty: bool,
    pub open_cursors: usize,
    pub stats: TableStats,
}

pub(crate) struct EngineState {
    pub closed: bool,
    pub open_sessions: usize,
    pub next_session_id: u64,
    pub tables: BTreeMap<String, TableState>,
    /// Tables dropped since the last checkpoint whose files must go
    pub dropped: BTreeSet<String>,
    pub next_file_id: u32,
    pub log: Option<LogWriter>,
    pub stats: ConnectionStats,
}

impl EngineState {
    pub(crate) fn table(&self, ident: &str) -> InspectResult<&TableState> {
        self.tables
            .get(ident)
            .ok_or_else(|| InspectError::engine("no such table").with_details(ident.to_string()))
    }

    pub(crate) fn table_mut(&mut self, ident: &str) -> InspectResult<&mut TableState> {
        self.tables
            .get_mut(ident)
            .ok_or_else(|| InspectError::engine("no such table").with_details(ident.to_string()))
    }

    /// Appends one transaction to the log if logging is enabled
    pub(crate) fn log_ops(
        &mut self,
        record_type: RecordType,
        ops: Vec<LogOp>,
    ) -> InspectResult<Option<Lsn>> {
        match self.log.as_mut() {
            Some(writer) => writer.append(record_type, ops).map(Some),
            None => Ok(None),
        }
    }
}

pub(crate) struct Shared {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub readonly: bool,
    pub state: Mutex<EngineState>,
}

impl Shared {
    pub(crate) fn lock(&self) -> InspectResult<MutexGuard<'_, EngineState>> {
        self.state
            .lock()
            .map_err(|_| InspectError::engine("engine state lock poisoned"))
    }

    pub(crate) fn ensure_writable(&self) -> InspectResult<()> {
        if self.readonly {
            return Err(InspectError::engine("connection is readonly")
                .with_details(self.data_dir.display().to_string()));
        }
        Ok(())
    }
}

/// Handle to an open data directory
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Opens (or with `create`, initialises) the data directory
    pub fn open(data_dir: &Path, config: &EngineConfig) -> InspectResult<Self> {
        if config.create && config.readonly {
            return Err(InspectError::engine("cannot create a readonly connection"));
        }

        let metadata_path = data_dir.join(METADATA_FILE);
        if !metadata_path.exists() {
            if !config.create {
                return Err(InspectError::engine("no data directory found")
                    .with_details(data_dir.display().to_string()));
            }
            fs::create_dir_all(data_dir).map_err(|e| {
                InspectError::engine_io("failed to create data directory", e)
                    .with_details(data_dir.display().to_string())
            })?;
            write_table_file(&metadata_path, &Rows::new())?;
        }

        let tables = Self::load_tables(data_dir, &metadata_path)?;
        let next_file_id = tables
            .values()
            .map(|t| t.meta.file_id + 1)
            .max()
            .unwrap_or(FIRST_TABLE_FILE_ID)
            .max(FIRST_TABLE_FILE_ID);

        let log_dir = data_dir.join(&config.log.path);
        let log = if config.log.enabled && !config.readonly {
            Some(LogWriter::open(&log_dir, config.log.file_max)?)
        } else {
            None
        };

        let table_count = tables.len().to_string();
        let state = EngineState {
            closed: false,
            open_sessions: 0,
            next_session_id: 1,
            tables,
            dropped: BTreeSet::new(),
            next_file_id,
            log,
            stats: ConnectionStats::default(),
        };

        log_event_with_fields(
            Event::ConnectionOpened,
            &[
                ("data_dir", &data_dir.display().to_string()),
                ("readonly", if config.readonly { "true" } else { "false" }),
                ("tables", &table_count),
            ],
        );

        Ok(Self {
            shared: Arc::new(Shared {
                data_dir: data_dir.to_path_buf(),
                log_dir,
                readonly: config.readonly,
                state: Mutex::new(state),
            }),
        })
    }

    fn load_tables(
        data_dir: &Path,
        metadata_path: &Path,
    ) -> InspectResult<BTreeMap<String, TableState>> {
        let mut tables = BTreeMap::new();
        for (key, value) in read_table_file(metadata_path)? {
            let uri = String::from_utf8(key)
                .map_err(|_| InspectError::engine("metadata key is not UTF-8"))?;
            let config = String::from_utf8(value).map_err(|_| {
                InspectError::engine("metadata value is not UTF-8").with_details(uri.clone())
            })?;
            let meta = TableMetadata::parse(&uri, &config)?;

            let path = data_dir.join(meta.file_name());
            let rows = read_table_file(&path)?;
            let file_size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

            tables.insert(
                meta.ident.clone(),
                TableState {
                    meta,
                    rows,
                    dirty: false,
                    open_cursors: 0,
                    stats: TableStats {
                        file_size,
                        ..TableStats::default()
                    },
                },
            );
        }
        Ok(tables)
    }

    /// Opens a new session
    pub fn open_session(&self) -> InspectResult<Session> {
        let mut state = self.shared.lock()?;
        if state.closed {
            return Err(InspectError::resource("connection is closed"));
        }
        let id = state.next_session_id;
        state.next_session_id += 1;
        state.open_sessions += 1;
        state.stats.sessions_opened += 1;
        drop(state);

        Ok(Session::new(Arc::new(SessionInner::new(
            Arc::clone(&self.shared),
            id,
        ))))
    }

    /// Closes the connection. Every session must have been closed first;
    /// mutations not covered by a checkpoint are discarded.
    pub fn close(&self) -> InspectResult<()> {
        let mut state = self.shared.lock()?;
        if state.closed {
            return Ok(());
        }
        if state.open_sessions > 0 {
            return Err(InspectError::resource("connection has open sessions")
                .with_details(format!("{} open", state.open_sessions)));
        }
        state.closed = true;
        state.log = None;
        drop(state);

        log_event_with_fields(
            Event::ConnectionClosed,
            &[("data_dir", &self.shared.data_dir.display().to_string())],
        );
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.shared.data_dir
    }

    pub fn log_dir(&self) -> &Path {
        &self.shared.log_dir
    }

    pub fn is_readonly(&self) -> bool {
        self.shared.readonly
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().map(|s| s.closed).unwrap_or(true)
    }
}
