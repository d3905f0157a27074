//! Checkpoint coordination
//!
//! A checkpoint runs in two steps:
//!
//! 1. Engine checkpoint: dirty tables and metadata rewritten atomically,
//!    checkpoint record appended and fsynced to the log
//! 2. Marker write: `checkpoint.json` describing the checkpoint, fsynced
//!
//! Any failure aborts the checkpoint. A failure in step 2 leaves the
//! engine state durable but the marker stale.

use crate::engine::Connection;
use crate::errors::InspectResult;
use crate::observability::ObservationScope;

use super::marker::{marker_path, CheckpointMarker};

/// Forces durability for one connection
pub struct CheckpointCoordinator<'c> {
    conn: &'c Connection,
}

impl<'c> CheckpointCoordinator<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Makes every pending mutation durable and records the marker
    ///
    /// Blocks until both the engine files and the marker are fsynced.
    pub fn checkpoint(&self) -> InspectResult<CheckpointMarker> {
        let data_dir = self.conn.data_dir().display().to_string();
        let scope = ObservationScope::with_fields("CHECKPOINT", &[("data_dir", &data_dir)]);

        match self.checkpoint_inner() {
            Ok(marker) => {
                let lsn = marker.lsn.map(|lsn| lsn.to_string()).unwrap_or_default();
                scope.complete_with_fields(&[
                    ("checkpoint_id", &marker.checkpoint_id),
                    ("lsn", &lsn),
                    ("tables_written", &marker.tables_written.to_string()),
                ]);
                Ok(marker)
            }
            Err(e) => {
                if e.is_fatal() {
                    scope.fail_fatal(&e.to_string());
                } else {
                    scope.fail(&e.to_string());
                }
                Err(e)
            }
        }
    }

    fn checkpoint_inner(&self) -> InspectResult<CheckpointMarker> {
        let session = self.conn.open_session()?;
        let summary = session.checkpoint()?;
        session.close()?;

        let marker = CheckpointMarker::new(&summary);
        marker.write_to_file(&marker_path(self.conn.data_dir()))?;
        Ok(marker)
    }

    /// Runs a mutation sequence, then checkpoints
    ///
    /// The checkpoint runs after success and after non-fatal errors, so
    /// the mutations that did apply are kept. A fatal error skips it.
    /// The error of `op` wins over a checkpoint error.
    pub fn run<T, F>(&self, op: F) -> InspectResult<T>
    where
        F: FnOnce(&Connection) -> InspectResult<T>,
    {
        match op(self.conn) {
            Ok(value) => {
                self.checkpoint()?;
                Ok(value)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                // Already logged by the scope
                let _ = self.checkpoint();
                Err(e)
            }
        }
    }

    /// Reads the marker of the last completed checkpoint
    pub fn last_marker(&self) -> InspectResult<Option<CheckpointMarker>> {
        CheckpointMarker::read_from_file(&marker_path(self.conn.data_dir()))
    }
}
