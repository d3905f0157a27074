//! Log inspection
//!
//! [`LogReader`] walks the engine log oldest first and classifies each
//! operation:
//!
//! - operations on file id 0 (metadata) or 2 (checkpoint) are `Unknown`
//! - a value that is exactly one BSON document is a `Document`
//! - an operation on an index table the catalog knows decodes as `Index`
//! - anything else is `Unknown`
//!
//! Nothing read here is ever applied.

mod reader;
mod record;

pub use reader::{LogReader, LogStream};
pub use record::{Decoded, LogRecord};
