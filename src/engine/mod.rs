//! Embedded ordered key-value engine
//!
//! A small file-backed engine with the surface storescope needs:
//! connections, sessions, four cursor families (table, metadata, log,
//! statistics), table create/drop and checkpoints.
//!
//! # Data directory
//!
//! ```text
//! <data_dir>/
//!   metadata.tbl          table:<ident> -> config string (file id 0)
//!   <ident>.tbl           one file per table
//!   journal/log.NNNNNNNNNN
//!   checkpoint.json       written by the checkpoint coordinator
//! ```
//!
//! # Durability
//!
//! Mutations are logged (with fsync) and applied in memory. Table files
//! change only at checkpoint; mutations made after the last checkpoint are
//! gone after reopen, although the log still shows them.

mod connection;
mod cursor;
mod frame;
mod log;
mod metadata;
mod session;
mod stats;
mod table_file;

pub use connection::{Connection, EngineConfig, LogSettings, METADATA_FILE};
pub use cursor::{LogCursor, MetadataCursor, StatisticsCursor, TableCursor};
pub use log::{LogEntry, Lsn, OpType, RecordType};
pub use metadata::{
    KeyFormat, TableMetadata, CHECKPOINT_FILE_ID, FIRST_TABLE_FILE_ID, METADATA_FILE_ID,
    TABLE_URI_PREFIX,
};
pub use session::{CheckpointSummary, Session};

const SIGN_FLIP: u64 = 0x8000_0000_0000_0000;

/// Encodes a record id as a `q`-format key that sorts numerically
pub fn encode_record_key(key: i64) -> [u8; 8] {
    ((key as u64) ^ SIGN_FLIP).to_be_bytes()
}

/// Decodes a `q`-format key; `None` unless exactly 8 bytes
pub fn decode_record_key(bytes: &[u8]) -> Option<i64> {
    let array: [u8; 8] = bytes.try_into().ok()?;
    Some((u64::from_be_bytes(array) ^ SIGN_FLIP) as i64)
}
