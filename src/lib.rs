//! storescope - direct inspection of a document store's physical tables
//!
//! Resolves `database.collection` namespaces through the catalog table,
//! reads and writes BSON records, decodes KeyString index entries and
//! streams the write-ahead log, all without a running server.

pub mod catalog;
pub mod checkpoint;
pub mod cli;
pub mod engine;
pub mod errors;
pub mod journal;
pub mod keystring;
pub mod observability;
pub mod table;

pub use errors::{InspectError, InspectResult};
