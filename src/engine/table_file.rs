//! On-disk table files
//!
//! ```text
//! +---------------------+
//! | Magic "SSTB"        |
//! | Version (u8)        |
//! +---------------------+
//! | Entry               |  repeated, ascending key order
//! |   Length (u32 LE)   |
//! |   Key (len-prefixed)|
//! |   Value (len-prefixed)
//! |   Checksum (u32 LE) |
//! +---------------------+
//! ```
//!
//! Files are replaced atomically: written to `<name>.tmp`, fsynced, then
//! renamed over the original.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use super::frame::{open_frame, patch_len, put_bytes, seal, ByteReader};
use crate::errors::{InspectError, InspectResult};

pub(crate) type Rows = BTreeMap<Vec<u8>, Vec<u8>>;

const MAGIC: &[u8; 4] = b"SSTB";
const FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = 5;

/// length + key len + value len + checksum
const MIN_ENTRY_LEN: usize = 4 + 4 + 4 + 4;

fn encode_entry(key: &[u8], value: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MIN_ENTRY_LEN + key.len() + value.len());
    buf.extend_from_slice(&[0u8; 4]);
    put_bytes(&mut buf, key);
    put_bytes(&mut buf, value);
    let total = buf.len() + 4;
    patch_len(&mut buf, total);
    seal(buf)
}

/// Serializes a full table image
pub(crate) fn encode_table(rows: &Rows) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + rows.len() * MIN_ENTRY_LEN);
    out.extend_from_slice(MAGIC);
    out.push(FORMAT_VERSION);
    for (key, value) in rows {
        out.extend_from_slice(&encode_entry(key, value));
    }
    out
}

/// Parses a full table image; any framing or checksum failure is an
/// engine error naming the byte offset
pub(crate) fn decode_table(data: &[u8], name: &str) -> InspectResult<Rows> {
    if data.len() < HEADER_LEN || &data[..4] != MAGIC {
        return Err(InspectError::engine("not a table file").with_details(name.to_string()));
    }
    if data[4] != FORMAT_VERSION {
        return Err(InspectError::engine("unsupported table file version")
            .with_details(format!("{}: version {}", name, data[4])));
    }

    let mut rows = Rows::new();
    let mut offset = HEADER_LEN;
    while offset < data.len() {
        let corrupt = |reason: String| {
            InspectError::engine("corrupt table file")
                .with_details(format!("{} at offset {}: {}", name, offset, reason))
        };
        let (body, total) = open_frame(&data[offset..], MIN_ENTRY_LEN).map_err(corrupt)?;
        let mut reader = ByteReader::new(body);
        let key = reader.bytes().map_err(corrupt)?;
        let value = reader.bytes().map_err(corrupt)?;
        if !reader.is_empty() {
            return Err(corrupt("entry has trailing bytes".to_string()));
        }
        rows.insert(key, value);
        offset += total;
    }
    Ok(rows)
}

pub(crate) fn read_table_file(path: &Path) -> InspectResult<Rows> {
    let data = fs::read(path).map_err(|e| {
        InspectError::engine_io("failed to read table file", e)
            .with_details(path.display().to_string())
    })?;
    decode_table(&data, &path.display().to_string())
}

/// Atomically replaces `path` with the table image; returns the file size
pub(crate) fn write_table_file(path: &Path, rows: &Rows) -> InspectResult<u64> {
    let image = encode_table(rows);
    let tmp = path.with_extension("tmp");
    let io_err = |what: &str, e: io::Error| {
        InspectError::engine_io(format!("failed to {} table file", what), e)
            .with_details(path.display().to_string())
    };

    let mut file = File::create(&tmp).map_err(|e| io_err("create", e))?;
    file.write_all(&image).map_err(|e| io_err("write", e))?;
    file.sync_all().map_err(|e| io_err("fsync", e))?;
    drop(file);
    fs::rename(&tmp, path).map_err(|e| io_err("rename", e))?;
    Ok(image.len() as u64)
}
