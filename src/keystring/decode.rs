//! KeyString decoding
//!
//! Reverses [`super::encode`]: the key pattern supplies field names and
//! directions, the entry value supplies the type bits (and for `{ _id: 1 }`
//! indexes, the record id).

use bson::oid::ObjectId;
use bson::spec::BinarySubtype;
use bson::{Binary, Bson, DateTime, Document, Timestamp};

use super::encode::{
    decode_record_id, tags, BIT_INT32, BIT_INT64, ESCAPE, NUM_DOUBLE, NUM_INTEGER, SIGN_FLIP,
    TERMINATOR,
};
use super::errors::{KeyStringError, KeyStringResult};
use super::key::KeyString;
use super::pattern::{Direction, KeyPattern};

struct KeyReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    invert: bool,
}

impl<'a> KeyReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            invert: false,
        }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn read_u8(&mut self) -> KeyStringResult<u8> {
        let byte = *self
            .bytes
            .get(self.pos)
            .ok_or(KeyStringError::Truncated { offset: self.pos })?;
        self.pos += 1;
        Ok(if self.invert { !byte } else { byte })
    }

    fn read_array<const N: usize>(&mut self) -> KeyStringResult<[u8; N]> {
        let mut out = [0u8; N];
        for byte in &mut out {
            *byte = self.read_u8()?;
        }
        Ok(out)
    }

    fn read_vec(&mut self, len: usize) -> KeyStringResult<Vec<u8>> {
        if self.remaining() < len {
            return Err(KeyStringError::Truncated {
                offset: self.bytes.len(),
            });
        }
        (0..len).map(|_| self.read_u8()).collect()
    }

    fn read_escaped(&mut self) -> KeyStringResult<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let byte = self.read_u8()?;
            if byte != TERMINATOR {
                out.push(byte);
                continue;
            }
            let offset = self.pos;
            match self.read_u8()? {
                TERMINATOR => return Ok(out),
                ESCAPE => out.push(TERMINATOR),
                _ => return Err(KeyStringError::InvalidEscape { offset }),
            }
        }
    }

    fn read_string(&mut self) -> KeyStringResult<String> {
        String::from_utf8(self.read_escaped()?).map_err(|_| KeyStringError::InvalidUtf8)
    }
}

/// Integer widths recorded alongside the key
struct TypeBits {
    codes: Vec<u8>,
    pos: usize,
    /// Entries logged without a value (index removals) carry no type bits;
    /// integers then decode as Int64
    lenient: bool,
}

impl TypeBits {
    fn parse(bytes: &[u8]) -> KeyStringResult<Self> {
        if bytes.is_empty() {
            return Ok(Self {
                codes: Vec::new(),
                pos: 0,
                lenient: true,
            });
        }
        if bytes.len() < 4 {
            return Err(KeyStringError::InvalidTypeBits(format!(
                "header needs 4 bytes, found {}",
                bytes.len()
            )));
        }
        let count = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        if bytes.len() - 4 != count {
            return Err(KeyStringError::InvalidTypeBits(format!(
                "declared {} codes, found {}",
                count,
                bytes.len() - 4
            )));
        }
        Ok(Self {
            codes: bytes[4..].to_vec(),
            pos: 0,
            lenient: false,
        })
    }

    fn integer(&mut self, value: i64) -> KeyStringResult<Bson> {
        if self.lenient {
            return Ok(Bson::Int64(value));
        }
        let code = *self
            .codes
            .get(self.pos)
            .ok_or_else(|| KeyStringError::InvalidTypeBits("exhausted".to_string()))?;
        self.pos += 1;
        match code {
            BIT_INT32 => i32::try_from(value).map(Bson::Int32).map_err(|_| {
                KeyStringError::InvalidTypeBits(format!("{} does not fit Int32", value))
            }),
            BIT_INT64 => Ok(Bson::Int64(value)),
            other => Err(KeyStringError::InvalidTypeBits(format!(
                "unknown code {}",
                other
            ))),
        }
    }

    fn finish(&self) -> KeyStringResult<()> {
        if self.pos < self.codes.len() {
            return Err(KeyStringError::InvalidTypeBits(format!(
                "{} unused codes",
                self.codes.len() - self.pos
            )));
        }
        Ok(())
    }
}

fn from_sortable_f64(encoded: u64) -> f64 {
    if encoded == 0 {
        f64::NAN
    } else if encoded & SIGN_FLIP != 0 {
        f64::from_bits(encoded ^ SIGN_FLIP)
    } else {
        f64::from_bits(!encoded)
    }
}

fn decode_value(reader: &mut KeyReader<'_>, bits: &mut TypeBits) -> KeyStringResult<Bson> {
    let offset = reader.pos;
    let tag = reader.read_u8()?;
    decode_body(tag, offset, reader, bits)
}

fn decode_body(
    tag: u8,
    offset: usize,
    reader: &mut KeyReader<'_>,
    bits: &mut TypeBits,
) -> KeyStringResult<Bson> {
    let value = match tag {
        tags::MIN_KEY => Bson::MinKey,
        tags::MAX_KEY => Bson::MaxKey,
        tags::UNDEFINED => Bson::Undefined,
        tags::NULL => Bson::Null,
        tags::NUMERIC => {
            let approx = u64::from_be_bytes(reader.read_array()?);
            let disc_offset = reader.pos;
            match reader.read_u8()? {
                NUM_DOUBLE => Bson::Double(from_sortable_f64(approx)),
                NUM_INTEGER => bits.integer(decode_record_id(reader.read_array()?))?,
                other => {
                    return Err(KeyStringError::UnknownTag {
                        tag: other,
                        offset: disc_offset,
                    })
                }
            }
        }
        tags::STRING => Bson::String(reader.read_string()?),
        tags::OBJECT => {
            let mut doc = Document::new();
            loop {
                let field_offset = reader.pos;
                let field_tag = reader.read_u8()?;
                if field_tag == TERMINATOR {
                    break;
                }
                let name = reader.read_string()?;
                let value = decode_body(field_tag, field_offset, reader, bits)?;
                doc.insert(name, value);
            }
            Bson::Document(doc)
        }
        tags::ARRAY => {
            let mut items = Vec::new();
            loop {
                let item_offset = reader.pos;
                let item_tag = reader.read_u8()?;
                if item_tag == TERMINATOR {
                    break;
                }
                items.push(decode_body(item_tag, item_offset, reader, bits)?);
            }
            Bson::Array(items)
        }
        tags::BIN_DATA => {
            let len = u32::from_be_bytes(reader.read_array()?) as usize;
            let subtype = BinarySubtype::from(reader.read_u8()?);
            Bson::Binary(Binary {
                subtype,
                bytes: reader.read_vec(len)?,
            })
        }
        tags::OBJECT_ID => Bson::ObjectId(ObjectId::from_bytes(reader.read_array()?)),
        tags::BOOL_FALSE => Bson::Boolean(false),
        tags::BOOL_TRUE => Bson::Boolean(true),
        tags::DATE => Bson::DateTime(DateTime::from_millis(decode_record_id(
            reader.read_array()?,
        ))),
        tags::TIMESTAMP => {
            let time = u32::from_be_bytes(reader.read_array()?);
            let increment = u32::from_be_bytes(reader.read_array()?);
            Bson::Timestamp(Timestamp { time, increment })
        }
        other => return Err(KeyStringError::UnknownTag { tag: other, offset }),
    };
    Ok(value)
}

/// Decodes one index entry into its key and record id
pub fn decode_entry(
    raw_key: &[u8],
    raw_value: &[u8],
    pattern: &KeyPattern,
) -> KeyStringResult<(KeyString, i64)> {
    let id_index = pattern.is_id_pattern();

    let (type_bits, value_record_id) = if id_index {
        if raw_value.len() < 8 {
            return Err(KeyStringError::MissingRecordId("value"));
        }
        let split = raw_value.len() - 8;
        let mut rid = [0u8; 8];
        rid.copy_from_slice(&raw_value[split..]);
        (&raw_value[..split], Some(decode_record_id(rid)))
    } else {
        (raw_value, None)
    };

    let mut bits = TypeBits::parse(type_bits)?;
    let mut reader = KeyReader::new(raw_key);
    let mut fields = Vec::with_capacity(pattern.len());
    for (name, direction) in pattern.fields() {
        reader.invert = *direction == Direction::Descending;
        let value = decode_value(&mut reader, &mut bits)?;
        fields.push((name.clone(), value));
    }
    reader.invert = false;
    bits.finish()?;

    let end_offset = reader.pos;
    let end = reader.read_u8()?;
    if end != tags::END {
        return Err(KeyStringError::MissingEnd {
            offset: end_offset,
            found: end,
        });
    }

    let record_id = match value_record_id {
        Some(rid) => rid,
        None => {
            if reader.remaining() < 8 {
                return Err(KeyStringError::MissingRecordId("key"));
            }
            decode_record_id(reader.read_array()?)
        }
    };

    if reader.remaining() > 0 {
        return Err(KeyStringError::TrailingBytes {
            count: reader.remaining(),
        });
    }

    Ok((KeyString::new(fields), record_id))
}
