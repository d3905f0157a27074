//! Checkpoint coordination for storescope
//!
//! Mutations made through the engine live in memory until a checkpoint
//! rewrites the affected tables. [`CheckpointCoordinator`] forces that
//! rewrite, records `checkpoint.json`, and wraps mutation sequences so they
//! end in a checkpoint unless a fatal error occurred.

mod coordinator;
mod marker;

pub use coordinator::CheckpointCoordinator;
pub use marker::{marker_path, CheckpointMarker, MARKER_FILE, MARKER_FORMAT_VERSION};
