//! Catalog resolution
//!
//! The catalog table `_mdb_catalog` maps each logical namespace
//! (`database.collection`) to the physical table holding its documents and
//! to the tables of its indexes.

mod entry;
mod resolver;

pub use entry::{CatalogEntry, IndexSpec};
pub use resolver::{generate_identity, Catalog, CatalogResolver, CATALOG_IDENT};
