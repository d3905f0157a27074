//! Physical table access
//!
//! [`TableAccessor`] is the single way the rest of the crate touches table
//! bytes. Its [`Kind`] decides the cursor family and how keys and values
//! decode:
//!
//! | Kind       | Key            | Value                    |
//! |------------|----------------|--------------------------|
//! | Collection | record id      | BSON document            |
//! | Catalog    | record id      | BSON catalog document    |
//! | Index      | KeyString      | type bits (+ record id)  |
//! | Metadata   | `table:<id>`   | engine config string     |
//! | Statistics | statistic name | counter                  |
//! | Log        | LSN            | raw log operation        |

mod accessor;
mod document;
mod entry;

pub use accessor::{Scan, TableAccessor};
pub use document::{decode_document, encode_document};
pub use entry::{Entry, IndexEntry, Kind, Record};
