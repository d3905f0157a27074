//! Engine write-ahead log
//!
//! Log files live in `<data_dir>/<log dir>/log.NNNNNNNNNN`. Each frame is one
//! auto-committed transaction:
//!
//! ```text
//! +------------------------+
//! | Length (u32 LE)        |
//! | Transaction id (u64)   |
//! | Record type (u8)       |
//! | Op count (u32)         |
//! +------------------------+
//! | Op                     |  repeated op count times
//! |   Op type (u8)         |
//! |   File id (u32)        |
//! |   Key (len-prefixed)   |
//! |   Value (len-prefixed) |
//! +------------------------+
//! | Checksum (u32 LE)      |
//! +------------------------+
//! ```
//!
//! A position in the log is an [`Lsn`]: log file number, frame offset and
//! op index within the frame.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::frame::{open_frame, patch_len, put_bytes, put_u32, put_u64, seal, ByteReader};
use crate::errors::{InspectError, InspectResult};

const LOG_FILE_PREFIX: &str = "log.";

/// length + txn id + record type + op count + checksum
const MIN_FRAME_LEN: usize = 4 + 8 + 1 + 4 + 4;

/// Log sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Lsn {
    pub file: u32,
    pub offset: u64,
    pub opcount: u32,
}

impl Lsn {
    pub fn new(file: u32, offset: u64, opcount: u32) -> Self {
        Self {
            file,
            offset,
            opcount,
        }
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.file, self.offset, self.opcount)
    }
}

/// Log frame type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Checkpoint = 0,
    Commit = 1,
}

impl RecordType {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(RecordType::Checkpoint),
            1 => Some(RecordType::Commit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Checkpoint => "checkpoint",
            RecordType::Commit => "commit",
        }
    }
}

/// Operation type within a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
    RowPut = 1,
    RowRemove = 2,
    TableCreate = 3,
    TableDrop = 4,
    Checkpoint = 5,
}

impl OpType {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(OpType::RowPut),
            2 => Some(OpType::RowRemove),
            3 => Some(OpType::TableCreate),
            4 => Some(OpType::TableDrop),
            5 => Some(OpType::Checkpoint),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OpType::RowPut => "row_put",
            OpType::RowRemove => "row_remove",
            OpType::TableCreate => "table_create",
            OpType::TableDrop => "table_drop",
            OpType::Checkpoint => "checkpoint",
        }
    }
}

/// One operation inside a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOp {
    pub op_type: OpType,
    pub file_id: u32,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// One flattened operation as read back from the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub lsn: Lsn,
    pub txn_id: u64,
    pub record_type: RecordType,
    pub op_type: OpType,
    pub file_id: u32,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LogFrame {
    pub txn_id: u64,
    pub record_type: RecordType,
    pub ops: Vec<LogOp>,
}

impl LogFrame {
    pub(crate) fn serialize(&self) -> Vec<u8> {
        let mut buf = vec![0u8; 4];
        put_u64(&mut buf, self.txn_id);
        buf.push(self.record_type as u8);
        put_u32(&mut buf, self.ops.len() as u32);
        for op in &self.ops {
            buf.push(op.op_type as u8);
            put_u32(&mut buf, op.file_id);
            put_bytes(&mut buf, &op.key);
            put_bytes(&mut buf, &op.value);
        }
        let total = buf.len() + 4;
        patch_len(&mut buf, total);
        seal(buf)
    }

    /// Parses the frame at the start of `data`, returning it and its length
    pub(crate) fn deserialize(data: &[u8]) -> Result<(Self, usize), String> {
        let (body, total) = open_frame(data, MIN_FRAME_LEN)?;
        let mut reader = ByteReader::new(body);

        let txn_id = reader.u64()?;
        let raw_type = reader.u8()?;
        let record_type = RecordType::from_u8(raw_type)
            .ok_or_else(|| format!("unknown record type {}", raw_type))?;
        let op_count = reader.u32()?;

        let mut ops = Vec::new();
        for _ in 0..op_count {
            let raw_op = reader.u8()?;
            let op_type =
                OpType::from_u8(raw_op).ok_or_else(|| format!("unknown op type {}", raw_op))?;
            ops.push(LogOp {
                op_type,
                file_id: reader.u32()?,
                key: reader.bytes()?,
                value: reader.bytes()?,
            });
        }
        if !reader.is_empty() {
            return Err("frame has trailing bytes".to_string());
        }

        Ok((
            Self {
                txn_id,
                record_type,
                ops,
            },
            total,
        ))
    }
}

pub(crate) fn log_file_name(number: u32) -> String {
    format!("{}{:010}", LOG_FILE_PREFIX, number)
}

/// Lists `(number, path)` of every log file in ascending order
pub(crate) fn list_log_files(dir: &Path) -> InspectResult<Vec<(u32, PathBuf)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir).map_err(|e| {
        InspectError::engine_io("failed to list log directory", e)
            .with_details(dir.display().to_string())
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| InspectError::engine_io("failed to list log directory", e))?;
        let name = entry.file_name();
        let number = name
            .to_str()
            .and_then(|n| n.strip_prefix(LOG_FILE_PREFIX))
            .and_then(|n| n.parse::<u32>().ok());
        if let Some(number) = number {
            files.push((number, entry.path()));
        }
    }
    files.sort();
    Ok(files)
}

/// Sequential reader over one log file
pub(crate) struct LogFileReader {
    number: u32,
    data: Vec<u8>,
    offset: usize,
}

impl LogFileReader {
    pub(crate) fn open(number: u32, path: &Path) -> InspectResult<Self> {
        let data = fs::read(path).map_err(|e| {
            InspectError::engine_io("failed to read log file", e)
                .with_details(path.display().to_string())
        })?;
        Ok(Self {
            number,
            data,
            offset: 0,
        })
    }

    /// Returns the next frame and its offset, `None` at end of file
    pub(crate) fn next_frame(&mut self) -> InspectResult<Option<(u64, LogFrame)>> {
        if self.offset >= self.data.len() {
            return Ok(None);
        }
        let offset = self.offset;
        let (frame, total) = LogFrame::deserialize(&self.data[offset..]).map_err(|reason| {
            InspectError::engine("corrupt log frame").with_details(format!(
                "{} at offset {}: {}",
                log_file_name(self.number),
                offset,
                reason
            ))
        })?;
        self.offset += total;
        Ok(Some((offset as u64, frame)))
    }
}

/// Append-only log writer
///
/// Every append is followed by fsync. A writer always starts a fresh file;
/// files rotate once they reach `file_max` bytes.
pub(crate) struct LogWriter {
    dir: PathBuf,
    file: File,
    file_number: u32,
    offset: u64,
    file_max: u64,
    next_txn_id: u64,
    records_written: u64,
    bytes_written: u64,
}

impl LogWriter {
    pub(crate) fn open(dir: &Path, file_max: u64) -> InspectResult<Self> {
        fs::create_dir_all(dir).map_err(|e| {
            InspectError::engine_io("failed to create log directory", e)
                .with_details(dir.display().to_string())
        })?;

        let existing = list_log_files(dir)?;
        let next_txn_id = Self::determine_next_txn_id(&existing);
        let file_number = existing.last().map(|(n, _)| n + 1).unwrap_or(1);
        let file = Self::create_file(dir, file_number)?;

        Ok(Self {
            dir: dir.to_path_buf(),
            file,
            file_number,
            offset: 0,
            file_max,
            next_txn_id,
            records_written: 0,
            bytes_written: 0,
        })
    }

    /// Scans existing files for the highest transaction id. A torn frame at
    /// the tail of a file ends the scan of that file.
    fn determine_next_txn_id(files: &[(u32, PathBuf)]) -> u64 {
        let mut max_txn = 0u64;
        for (number, path) in files {
            let Ok(mut reader) = LogFileReader::open(*number, path) else {
                continue;
            };
            while let Ok(Some((_, frame))) = reader.next_frame() {
                max_txn = max_txn.max(frame.txn_id);
            }
        }
        max_txn + 1
    }

    fn create_file(dir: &Path, number: u32) -> InspectResult<File> {
        let path = dir.join(log_file_name(number));
        OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                InspectError::engine_io("failed to create log file", e)
                    .with_details(path.display().to_string())
            })
    }

    fn rotate(&mut self) -> InspectResult<()> {
        self.file_number += 1;
        self.file = Self::create_file(&self.dir, self.file_number)?;
        self.offset = 0;
        Ok(())
    }

    /// Appends one transaction and returns the LSN of its first op
    pub(crate) fn append(&mut self, record_type: RecordType, ops: Vec<LogOp>) -> InspectResult<Lsn> {
        let frame = LogFrame {
            txn_id: self.next_txn_id,
            record_type,
            ops,
        }
        .serialize();

        if self.offset > 0 && self.offset + frame.len() as u64 > self.file_max {
            self.rotate()?;
        }

        let lsn = Lsn::new(self.file_number, self.offset, 0);
        self.file.write_all(&frame).map_err(|e| {
            InspectError::engine_io("failed to append log frame", e)
                .with_details(format!("lsn {}", lsn))
        })?;
        self.file.sync_all().map_err(|e| {
            InspectError::engine_io("fsync failed after log append", e)
                .with_details(format!("lsn {}", lsn))
        })?;

        self.offset += frame.len() as u64;
        self.next_txn_id += 1;
        self.records_written += 1;
        self.bytes_written += frame.len() as u64;
        Ok(lsn)
    }

    pub(crate) fn records_written(&self) -> u64 {
        self.records_written
    }

    pub(crate) fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub(crate) fn next_txn_id(&self) -> u64 {
        self.next_txn_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn put(file_id: u32, key: &[u8], value: &[u8]) -> Vec<LogOp> {
        vec![LogOp {
            op_type: OpType::RowPut,
            file_id,
            key: key.to_vec(),
            value: value.to_vec(),
        }]
    }

    fn read_all(dir: &Path) -> Vec<(u32, u64, LogFrame)> {
        let mut out = Vec::new();
        for (number, path) in list_log_files(dir).unwrap() {
            let mut reader = LogFileReader::open(number, &path).unwrap();
            while let Some((offset, frame)) = reader.next_frame().unwrap() {
                out.push((number, offset, frame));
            }
        }
        out
    }

    #[test]
    fn test_lsn_ordering() {
        assert!(Lsn::new(1, 500, 3) < Lsn::new(2, 0, 0));
        assert!(Lsn::new(1, 10, 0) < Lsn::new(1, 10, 1));
        assert_eq!(Lsn::new(1, 20, 0).to_string(), "1/20/0");
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = TempDir::new().unwrap();
        let mut writer = LogWriter::open(dir.path(), 1 << 20).unwrap();
        let first = writer.append(RecordType::Commit, put(3, b"k", b"v")).unwrap();
        let second = writer.append(RecordType::Commit, put(4, b"k2", b"")).unwrap();
        assert!(first < second);
        assert_eq!(writer.records_written(), 2);

        let frames = read_all(dir.path());
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].2.txn_id, 1);
        assert_eq!(frames[1].2.txn_id, 2);
        assert_eq!(frames[1].1, second.offset);
        assert_eq!(frames[1].2.ops[0].key, b"k2");
    }

    #[test]
    fn test_reopen_starts_new_file_and_continues_txn_ids() {
        let dir = TempDir::new().unwrap();
        {
            let mut writer = LogWriter::open(dir.path(), 1 << 20).unwrap();
            writer.append(RecordType::Commit, put(3, b"a", b"1")).unwrap();
            writer.append(RecordType::Commit, put(3, b"b", b"2")).unwrap();
        }
        let mut writer = LogWriter::open(dir.path(), 1 << 20).unwrap();
        assert_eq!(writer.next_txn_id(), 3);
        let lsn = writer.append(RecordType::Commit, put(3, b"c", b"3")).unwrap();
        assert_eq!(lsn.file, 2);
        assert_eq!(list_log_files(dir.path()).unwrap().len(), 2);
    }

    #[test]
    fn test_rotation_at_file_max() {
        let dir = TempDir::new().unwrap();
        let mut writer = LogWriter::open(dir.path(), 64).unwrap();
        let a = writer.append(RecordType::Commit, put(3, b"key-a", &[0; 20])).unwrap();
        let b = writer.append(RecordType::Commit, put(3, b"key-b", &[0; 20])).unwrap();
        assert_eq!(a.file, 1);
        assert_eq!(b.file, 2);
        assert_eq!(b.offset, 0);
    }

    #[test]
    fn test_corrupt_frame_reported_with_offset() {
        let dir = TempDir::new().unwrap();
        {
            let mut writer = LogWriter::open(dir.path(), 1 << 20).unwrap();
            writer.append(RecordType::Commit, put(3, b"a", b"1")).unwrap();
        }
        let path = dir.path().join(log_file_name(1));
        let mut data = fs::read(&path).unwrap();
        data[10] ^= 0xff;
        fs::write(&path, data).unwrap();

        let mut reader = LogFileReader::open(1, &path).unwrap();
        let err = reader.next_frame().unwrap_err();
        assert!(err.is_engine());
        assert!(err.to_string().contains("offset 0"));
    }
}
