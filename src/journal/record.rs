//! Decoded log records

use bson::Document;

use crate::engine::{LogEntry, Lsn, OpType, RecordType, CHECKPOINT_FILE_ID, METADATA_FILE_ID};
use crate::keystring::DecodedKey;

/// What a log operation's bytes turned out to be
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// The value is exactly one BSON document
    Document(Document),
    /// The operation is an index entry
    Index {
        namespace: String,
        index: String,
        entry: DecodedKey,
    },
    /// Non-data operation, or bytes that decode as neither
    Unknown,
}

impl Decoded {
    pub fn label(&self) -> &'static str {
        match self {
            Decoded::Document(_) => "document",
            Decoded::Index { .. } => "index",
            Decoded::Unknown => "unknown",
        }
    }
}

/// One log operation with its decoding
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub lsn: Lsn,
    pub txn_id: u64,
    pub record_type: RecordType,
    pub op_type: OpType,
    pub file_id: u32,
    /// Table the file id belonged to, when the metadata still lists it
    pub identity: Option<String>,
    pub raw_key: Vec<u8>,
    pub raw_value: Vec<u8>,
    pub decoded: Decoded,
}

impl LogRecord {
    pub(crate) fn new(entry: LogEntry, identity: Option<String>, decoded: Decoded) -> Self {
        Self {
            lsn: entry.lsn,
            txn_id: entry.txn_id,
            record_type: entry.record_type,
            op_type: entry.op_type,
            file_id: entry.file_id,
            identity,
            raw_key: entry.key,
            raw_value: entry.value,
            decoded,
        }
    }

    /// True for operations on the metadata or checkpoint files
    pub fn is_non_data(&self) -> bool {
        is_non_data_file(self.file_id)
    }
}

pub(crate) fn is_non_data_file(file_id: u32) -> bool {
    file_id == METADATA_FILE_ID || file_id == CHECKPOINT_FILE_ID
}
