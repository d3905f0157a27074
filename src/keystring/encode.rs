//! Order-preserving KeyString encoding
//!
//! # Layout
//!
//! A key is the concatenation of one encoded value per pattern field, an
//! end marker, and (for every index except `{ _id: 1 }`) the record id:
//!
//! ```text
//! [field 0][field 1]...[END 0x04][record id, 8 bytes]
//! ```
//!
//! Every value starts with a canonical type tag so that values of different
//! types compare in BSON canonical order. Descending fields have every byte
//! of their encoding inverted.
//!
//! ## Numbers
//!
//! All numeric types share one tag and compare by value:
//! - 8 bytes: the value as a sortable f64 (integers rounded toward negative
//!   infinity, NaN lowest, negative zero folded into zero)
//! - 1 byte: 0 for doubles, 1 for integers
//! - integers only: the exact i64, sign-flipped big-endian
//!
//! Whether an integer was Int32 or Int64 is not part of the ordering; it is
//! recorded in the type bits stored in the entry value.
//!
//! ## Strings
//!
//! UTF-8 bytes with `0x00` escaped as `0x00 0x01`, terminated by
//! `0x00 0x00`, so that `"a" < "aa" < "ab" < "b"`.
//!
//! ## Value layout
//!
//! ```text
//! [type bit count u32 BE][one byte per integer][record id, _id index only]
//! ```

use bson::{Bson, Document};

use super::errors::{KeyStringError, KeyStringResult};
use super::pattern::{Direction, KeyPattern};

/// Canonical type tags
pub(crate) mod tags {
    pub const MIN_KEY: u8 = 10;
    pub const UNDEFINED: u8 = 15;
    pub const NULL: u8 = 20;
    pub const NUMERIC: u8 = 30;
    pub const STRING: u8 = 60;
    pub const OBJECT: u8 = 70;
    pub const ARRAY: u8 = 80;
    pub const BIN_DATA: u8 = 90;
    pub const OBJECT_ID: u8 = 100;
    pub const BOOL_FALSE: u8 = 110;
    pub const BOOL_TRUE: u8 = 111;
    pub const DATE: u8 = 120;
    pub const TIMESTAMP: u8 = 130;
    pub const MAX_KEY: u8 = 240;
    pub const END: u8 = 0x04;
}

/// Terminates objects, arrays and (doubled) strings
pub(crate) const TERMINATOR: u8 = 0x00;
pub(crate) const ESCAPE: u8 = 0x01;

pub(crate) const SIGN_FLIP: u64 = 0x8000_0000_0000_0000;

/// Numeric discriminators following the sortable f64
pub(crate) const NUM_DOUBLE: u8 = 0;
pub(crate) const NUM_INTEGER: u8 = 1;

/// Type bit codes
pub(crate) const BIT_INT32: u8 = 1;
pub(crate) const BIT_INT64: u8 = 2;

/// Encodes a record id so that byte order matches numeric order
pub fn encode_record_id(record_id: i64) -> [u8; 8] {
    ((record_id as u64) ^ SIGN_FLIP).to_be_bytes()
}

pub(crate) fn decode_record_id(bytes: [u8; 8]) -> i64 {
    (u64::from_be_bytes(bytes) ^ SIGN_FLIP) as i64
}

pub(crate) fn sortable_f64(value: f64) -> u64 {
    if value.is_nan() {
        return 0;
    }
    let bits = if value == 0.0 { 0 } else { value.to_bits() };
    if bits & SIGN_FLIP == 0 {
        bits ^ SIGN_FLIP
    } else {
        !bits
    }
}

/// Largest f64 not greater than `value`
fn floor_f64(value: i64) -> f64 {
    let approx = value as f64;
    if (approx as i128) > value as i128 {
        let bits = approx.to_bits();
        if approx > 0.0 {
            f64::from_bits(bits - 1)
        } else {
            f64::from_bits(bits + 1)
        }
    } else {
        approx
    }
}

/// Accumulates one key and its type bits
#[derive(Debug, Default)]
pub struct KeyStringBuilder {
    buf: Vec<u8>,
    type_bits: Vec<u8>,
}

impl KeyStringBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one field value in the given direction
    pub fn append(&mut self, value: &Bson, direction: Direction) -> KeyStringResult<()> {
        let start = self.buf.len();
        self.append_value(value)?;
        if direction == Direction::Descending {
            for byte in &mut self.buf[start..] {
                *byte = !*byte;
            }
        }
        Ok(())
    }

    /// Finishes the entry, returning `(key, value)` bytes
    pub fn finish(mut self, record_id: i64, id_index: bool) -> (Vec<u8>, Vec<u8>) {
        self.buf.push(tags::END);

        let mut value = Vec::with_capacity(4 + self.type_bits.len() + 8);
        value.extend_from_slice(&(self.type_bits.len() as u32).to_be_bytes());
        value.extend_from_slice(&self.type_bits);

        if id_index {
            value.extend_from_slice(&encode_record_id(record_id));
        } else {
            self.buf.extend_from_slice(&encode_record_id(record_id));
        }
        (self.buf, value)
    }

    fn append_value(&mut self, value: &Bson) -> KeyStringResult<()> {
        match value {
            Bson::MinKey => self.buf.push(tags::MIN_KEY),
            Bson::MaxKey => self.buf.push(tags::MAX_KEY),
            Bson::Undefined => self.buf.push(tags::UNDEFINED),
            Bson::Null => self.buf.push(tags::NULL),
            Bson::Double(v) => {
                self.buf.push(tags::NUMERIC);
                self.buf.extend_from_slice(&sortable_f64(*v).to_be_bytes());
                self.buf.push(NUM_DOUBLE);
            }
            Bson::Int32(v) => self.append_integer(*v as i64, BIT_INT32),
            Bson::Int64(v) => self.append_integer(*v, BIT_INT64),
            Bson::String(s) => {
                self.buf.push(tags::STRING);
                self.append_escaped(s.as_bytes());
            }
            Bson::Document(doc) => self.append_object(doc)?,
            Bson::Array(items) => {
                self.buf.push(tags::ARRAY);
                for item in items {
                    self.append_value(item)?;
                }
                self.buf.push(TERMINATOR);
            }
            Bson::Binary(bin) => {
                self.buf.push(tags::BIN_DATA);
                self.buf
                    .extend_from_slice(&(bin.bytes.len() as u32).to_be_bytes());
                self.buf.push(u8::from(bin.subtype));
                self.buf.extend_from_slice(&bin.bytes);
            }
            Bson::ObjectId(oid) => {
                self.buf.push(tags::OBJECT_ID);
                self.buf.extend_from_slice(&oid.bytes());
            }
            Bson::Boolean(false) => self.buf.push(tags::BOOL_FALSE),
            Bson::Boolean(true) => self.buf.push(tags::BOOL_TRUE),
            Bson::DateTime(dt) => {
                self.buf.push(tags::DATE);
                self.buf
                    .extend_from_slice(&encode_record_id(dt.timestamp_millis()));
            }
            Bson::Timestamp(ts) => {
                self.buf.push(tags::TIMESTAMP);
                self.buf.extend_from_slice(&ts.time.to_be_bytes());
                self.buf.extend_from_slice(&ts.increment.to_be_bytes());
            }
            other => {
                return Err(KeyStringError::UnsupportedType(format!(
                    "{:?}",
                    other.element_type()
                )))
            }
        }
        Ok(())
    }

    fn append_integer(&mut self, value: i64, type_bit: u8) {
        self.buf.push(tags::NUMERIC);
        self.buf
            .extend_from_slice(&sortable_f64(floor_f64(value)).to_be_bytes());
        self.buf.push(NUM_INTEGER);
        self.buf.extend_from_slice(&encode_record_id(value));
        self.type_bits.push(type_bit);
    }

    fn append_object(&mut self, doc: &Document) -> KeyStringResult<()> {
        self.buf.push(tags::OBJECT);
        for (name, value) in doc {
            // [value tag][field name][value body]
            let tag_at = self.buf.len();
            self.append_value(value)?;
            let body = self.buf.split_off(tag_at + 1);
            self.append_escaped(name.as_bytes());
            self.buf.extend_from_slice(&body);
        }
        self.buf.push(TERMINATOR);
        Ok(())
    }

    fn append_escaped(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.buf.push(byte);
            if byte == TERMINATOR {
                self.buf.push(ESCAPE);
            }
        }
        self.buf.push(TERMINATOR);
        self.buf.push(TERMINATOR);
    }
}

/// Encodes one index entry from values given in pattern order
pub fn encode_key(
    values: &[Bson],
    pattern: &KeyPattern,
    record_id: i64,
) -> KeyStringResult<(Vec<u8>, Vec<u8>)> {
    if values.len() != pattern.len() {
        return Err(KeyStringError::ArityMismatch {
            expected: pattern.len(),
            actual: values.len(),
        });
    }
    let mut builder = KeyStringBuilder::new();
    for (value, (_, direction)) in values.iter().zip(pattern.fields()) {
        builder.append(value, *direction)?;
    }
    Ok(builder.finish(record_id, pattern.is_id_pattern()))
}

/// Index entries generated for one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexKeys {
    /// `(key, value)` pairs, sorted by key, duplicates removed
    pub entries: Vec<(Vec<u8>, Vec<u8>)>,
    /// Pattern fields whose path traversed an array
    pub multikey_paths: Vec<String>,
}

/// Generates every index entry a document produces under `pattern`
///
/// Missing fields index as null. A field whose path crosses an array
/// produces one entry per element (an empty array indexes as undefined).
/// At most one field may do so per document.
pub fn encode_index_keys(
    doc: &Document,
    pattern: &KeyPattern,
    record_id: i64,
) -> KeyStringResult<IndexKeys> {
    let root = Bson::Document(doc.clone());
    let mut per_field = Vec::with_capacity(pattern.len());
    let mut multikey_paths = Vec::new();
    let mut multikey_field: Option<usize> = None;

    for (i, (path, _)) in pattern.fields().iter().enumerate() {
        let segments: Vec<&str> = path.split('.').collect();
        let mut values = Vec::new();
        let mut through_array = false;
        collect_path(&root, &segments, &mut values, &mut through_array);

        if through_array {
            if let Some(previous) = multikey_field {
                return Err(KeyStringError::ParallelArrays {
                    first: pattern.fields()[previous].0.clone(),
                    second: path.clone(),
                });
            }
            multikey_field = Some(i);
            multikey_paths.push(path.clone());
        }
        per_field.push(values);
    }

    let expansions = match multikey_field {
        Some(i) => per_field[i].len(),
        None => 1,
    };

    let mut entries = Vec::with_capacity(expansions);
    for n in 0..expansions {
        let values: Vec<Bson> = per_field
            .iter()
            .enumerate()
            .map(|(i, values)| {
                if Some(i) == multikey_field {
                    values[n].clone()
                } else {
                    values[0].clone()
                }
            })
            .collect();
        entries.push(encode_key(&values, pattern, record_id)?);
    }
    entries.sort();
    entries.dedup();

    Ok(IndexKeys {
        entries,
        multikey_paths,
    })
}

fn collect_path(value: &Bson, segments: &[&str], out: &mut Vec<Bson>, through_array: &mut bool) {
    let Some((segment, rest)) = segments.split_first() else {
        match value {
            Bson::Array(items) => {
                *through_array = true;
                if items.is_empty() {
                    out.push(Bson::Undefined);
                } else {
                    out.extend(items.iter().cloned());
                }
            }
            other => out.push(other.clone()),
        }
        return;
    };

    match value {
        Bson::Document(doc) => match doc.get(*segment) {
            Some(child) => collect_path(child, rest, out, through_array),
            None => out.push(Bson::Null),
        },
        Bson::Array(items) => {
            *through_array = true;
            let before = out.len();
            for item in items {
                if let Bson::Document(_) = item {
                    collect_path(item, segments, out, through_array);
                }
            }
            if out.len() == before {
                out.push(Bson::Null);
            }
        }
        _ => out.push(Bson::Null),
    }
}
