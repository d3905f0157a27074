//! Lifecycle events emitted by storescope

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Connection lifecycle
    ConnectionOpened,
    ConnectionClosed,
    ConnectionFailed,
    ConfigLoaded,

    // Catalog
    CatalogLoaded,
    CollectionRegistered,
    CollectionUnregistered,

    // Physical tables
    TableCreated,
    TableDropped,
    RecordInserted,
    RecordDeleted,

    /// A single entry failed to decode and was skipped
    EntrySkipped,

    // Log inspection
    LogStreamComplete,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConnectionOpened => "CONNECTION_OPENED",
            Event::ConnectionClosed => "CONNECTION_CLOSED",
            Event::ConnectionFailed => "CONNECTION_FAILED",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::CatalogLoaded => "CATALOG_LOADED",
            Event::CollectionRegistered => "COLLECTION_REGISTERED",
            Event::CollectionUnregistered => "COLLECTION_UNREGISTERED",
            Event::TableCreated => "TABLE_CREATED",
            Event::TableDropped => "TABLE_DROPPED",
            Event::RecordInserted => "RECORD_INSERTED",
            Event::RecordDeleted => "RECORD_DELETED",
            Event::EntrySkipped => "ENTRY_SKIPPED",
            Event::LogStreamComplete => "LOG_STREAM_COMPLETE",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::ConnectionFailed)
    }

    /// Returns true if this event reports a recoverable problem
    pub fn is_warning(&self) -> bool {
        matches!(self, Event::EntrySkipped)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
