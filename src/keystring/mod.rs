//! KeyString index key codec
//!
//! Index tables store one entry per (key, record) pair. The key bytes are
//! an order-preserving encoding of the indexed field values so that the
//! engine's byte order equals the index's logical order. The entry value
//! carries the type bits needed to restore exact numeric types.
//!
//! This module encodes entries (used when maintaining or fabricating
//! indexes) and decodes them for inspection, either natively or through an
//! external helper program.

mod codec;
mod decode;
mod encode;
mod errors;
mod key;
mod pattern;

pub use codec::{DecodedKey, ExternalKeyCodec, KeyCodec, NativeKeyCodec};
pub use decode::decode_entry;
pub use encode::{encode_index_keys, encode_key, encode_record_id, IndexKeys, KeyStringBuilder};
pub use errors::{KeyStringError, KeyStringResult};
pub use key::KeyString;
pub use pattern::{Direction, KeyPattern};
