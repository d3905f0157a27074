//! Checkpoint marker file
//!
//! `<data_dir>/checkpoint.json` records the last completed checkpoint:
//! - checkpoint_id: unique id of the checkpoint
//! - created_at: RFC3339 timestamp
//! - lsn: position of the checkpoint log record, if logging is enabled
//! - tables_written: dirty tables flushed by it
//! - format_version: always 1
//!
//! The marker is written after the engine checkpoint has succeeded, so a
//! marker on disk always describes durable state.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{CheckpointSummary, Lsn};
use crate::errors::{InspectError, InspectResult};

pub const MARKER_FILE: &str = "checkpoint.json";
pub const MARKER_FORMAT_VERSION: u8 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckpointMarker {
    pub checkpoint_id: String,
    pub created_at: String,
    pub lsn: Option<Lsn>,
    pub tables_written: usize,
    pub format_version: u8,
}

impl CheckpointMarker {
    /// Builds the marker for a checkpoint that just completed
    pub fn new(summary: &CheckpointSummary) -> Self {
        Self {
            checkpoint_id: Uuid::new_v4().simple().to_string(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            lsn: summary.lsn,
            tables_written: summary.tables_written,
            format_version: MARKER_FORMAT_VERSION,
        }
    }

    pub fn to_json(&self) -> InspectResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| InspectError::engine("failed to serialize checkpoint marker").with_source(e))
    }

    pub fn from_json(json: &str) -> InspectResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| InspectError::decode("failed to parse checkpoint marker").with_source(e))
    }

    /// Writes the marker and fsyncs both the file and its directory
    pub fn write_to_file(&self, path: &Path) -> InspectResult<()> {
        let json = self.to_json()?;
        let display = path.display().to_string();

        let mut file = File::create(path).map_err(|e| {
            InspectError::engine_io("failed to create checkpoint marker", e).with_details(display.clone())
        })?;
        file.write_all(json.as_bytes()).map_err(|e| {
            InspectError::engine_io("failed to write checkpoint marker", e).with_details(display.clone())
        })?;
        file.sync_all().map_err(|e| {
            InspectError::engine_io("failed to fsync checkpoint marker", e).with_details(display.clone())
        })?;

        if let Some(parent) = path.parent() {
            let dir = OpenOptions::new().read(true).open(parent).map_err(|e| {
                InspectError::engine_io("failed to open marker directory for fsync", e)
                    .with_details(parent.display().to_string())
            })?;
            dir.sync_all().map_err(|e| {
                InspectError::engine_io("failed to fsync marker directory", e)
                    .with_details(parent.display().to_string())
            })?;
        }
        Ok(())
    }

    /// Reads the marker; `Ok(None)` if no checkpoint was ever recorded
    pub fn read_from_file(path: &Path) -> InspectResult<Option<Self>> {
        match fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(InspectError::engine_io("failed to read checkpoint marker", e)
                .with_details(path.display().to_string())),
        }
    }
}

pub fn marker_path(data_dir: &Path) -> PathBuf {
    data_dir.join(MARKER_FILE)
}
