//! Engine statistics counters
//!
//! Statistic names follow the engine's `category: description` style so
//! that dumps read the same as the engine's own statistics output.

/// Per-table counters
#[derive(Debug, Clone, Default)]
pub(crate) struct TableStats {
    pub inserts: u64,
    pub removes: u64,
    pub searches: u64,
    pub checkpoint_writes: u64,
    pub file_size: u64,
}

/// Connection-wide counters
#[derive(Debug, Clone, Default)]
pub(crate) struct ConnectionStats {
    pub sessions_opened: u64,
    pub inserts: u64,
    pub removes: u64,
    pub searches: u64,
    pub checkpoints: u64,
    pub checkpoint_tables_written: u64,
}

fn stat(name: &str, value: u64) -> (String, i64) {
    (name.to_string(), i64::try_from(value).unwrap_or(i64::MAX))
}

pub(crate) fn table_statistics(
    stats: &TableStats,
    entries: usize,
    key_bytes: usize,
    value_bytes: usize,
) -> Vec<(String, i64)> {
    vec![
        stat("btree: row-store entries", entries as u64),
        stat("btree: key bytes", key_bytes as u64),
        stat("btree: value bytes", value_bytes as u64),
        stat("cursor: insert calls", stats.inserts),
        stat("cursor: remove calls", stats.removes),
        stat("cursor: search calls", stats.searches),
        stat("checkpoint: table writes", stats.checkpoint_writes),
        stat("block-manager: file size in bytes", stats.file_size),
    ]
}

pub(crate) struct ConnectionSnapshot<'a> {
    pub stats: &'a ConnectionStats,
    pub open_sessions: usize,
    pub tables: usize,
    pub log_records_written: u64,
    pub log_bytes_written: u64,
}

pub(crate) fn connection_statistics(snapshot: ConnectionSnapshot<'_>) -> Vec<(String, i64)> {
    let stats = snapshot.stats;
    vec![
        stat("connection: sessions opened", stats.sessions_opened),
        stat("connection: open sessions", snapshot.open_sessions as u64),
        stat("connection: tables", snapshot.tables as u64),
        stat("cursor: insert calls", stats.inserts),
        stat("cursor: remove calls", stats.removes),
        stat("cursor: search calls", stats.searches),
        stat("checkpoint: checkpoints", stats.checkpoints),
        stat("checkpoint: tables written", stats.checkpoint_tables_written),
        stat("log: records written", snapshot.log_records_written),
        stat("log: bytes written", snapshot.log_bytes_written),
    ]
}
