//! LogReader: streams and classifies log operations

use std::collections::HashMap;
use std::sync::Arc;

use super::record::{is_non_data_file, Decoded, LogRecord};
use crate::catalog::Catalog;
use crate::engine::{Connection, LogEntry};
use crate::errors::InspectResult;
use crate::keystring::{KeyCodec, KeyPattern};
use crate::observability::{log_event_with_fields, Event, ObservationScope};
use crate::table::{decode_document, Entry, Kind, Scan, TableAccessor};

/// Owner of an index table, as the catalog describes it
#[derive(Debug, Clone)]
struct IndexOwner {
    namespace: String,
    index: String,
    pattern: KeyPattern,
}

/// Reads the engine log; never applies anything it reads
pub struct LogReader {
    accessor: TableAccessor,
    /// file id → table identity, from the metadata namespace
    idents: HashMap<u32, String>,
    /// index table identity → owning collection and index
    indexes: HashMap<String, IndexOwner>,
    codec: Arc<dyn KeyCodec>,
}

impl LogReader {
    /// Builds the decode context and opens a log cursor
    pub fn open(
        conn: &Connection,
        catalog: &Catalog,
        codec: Arc<dyn KeyCodec>,
    ) -> InspectResult<Self> {
        let mut idents = HashMap::new();
        let mut metadata = TableAccessor::open(conn, "", Kind::Metadata, Arc::clone(&codec))?;
        for item in metadata.scan_all() {
            if let Entry::Metadata { meta, .. } = item? {
                idents.insert(meta.file_id, meta.ident);
            }
        }
        metadata.close()?;

        let indexes = catalog
            .iter()
            .flat_map(|entry| {
                entry.indexes.iter().map(move |index| {
                    (
                        index.identity.clone(),
                        IndexOwner {
                            namespace: entry.namespace.clone(),
                            index: index.name.clone(),
                            pattern: index.key_pattern.clone(),
                        },
                    )
                })
            })
            .collect();

        let accessor = TableAccessor::open(conn, "", Kind::Log, Arc::clone(&codec))?;
        Ok(Self {
            accessor,
            idents,
            indexes,
            codec,
        })
    }

    /// Lazily streams every log operation in ascending LSN order
    pub fn stream(&mut self) -> LogStream<'_> {
        LogStream {
            scan: self.accessor.scan_all(),
            idents: &self.idents,
            indexes: &self.indexes,
            codec: self.codec.as_ref(),
            scope: Some(ObservationScope::new("LOG_SCAN")),
            counts: Counts::default(),
        }
    }

    /// Returns the operations of the last transaction that touched data
    pub fn last_transaction(&mut self) -> InspectResult<Vec<LogRecord>> {
        let mut last: Vec<LogRecord> = Vec::new();
        for record in self.stream() {
            let record = record?;
            if record.is_non_data() {
                continue;
            }
            if last.first().map_or(true, |first| first.txn_id != record.txn_id) {
                last.clear();
            }
            last.push(record);
        }
        Ok(last)
    }

    pub fn close(self) -> InspectResult<()> {
        self.accessor.close()
    }
}

#[derive(Debug, Default)]
struct Counts {
    documents: usize,
    index: usize,
    unknown: usize,
}

/// Iterator returned by [`LogReader::stream`]
pub struct LogStream<'a> {
    scan: Scan<'a>,
    idents: &'a HashMap<u32, String>,
    indexes: &'a HashMap<String, IndexOwner>,
    codec: &'a dyn KeyCodec,
    scope: Option<ObservationScope>,
    counts: Counts,
}

impl LogStream<'_> {
    fn classify(&self, entry: &LogEntry, identity: Option<&str>) -> Decoded {
        if is_non_data_file(entry.file_id) {
            return Decoded::Unknown;
        }
        if let Ok(document) = decode_document(&entry.value) {
            return Decoded::Document(document);
        }
        let Some(owner) = identity.and_then(|ident| self.indexes.get(ident)) else {
            return Decoded::Unknown;
        };
        match self.codec.decode(&entry.key, &entry.value, &owner.pattern) {
            Ok(decoded) => Decoded::Index {
                namespace: owner.namespace.clone(),
                index: owner.index.clone(),
                entry: decoded,
            },
            Err(_) => Decoded::Unknown,
        }
    }

    fn finish(&mut self) {
        let Some(scope) = self.scope.take() else {
            return;
        };
        let documents = self.counts.documents.to_string();
        let index = self.counts.index.to_string();
        let unknown = self.counts.unknown.to_string();
        log_event_with_fields(
            Event::LogStreamComplete,
            &[("documents", &documents), ("index", &index), ("unknown", &unknown)],
        );
        scope.complete();
    }
}

impl Iterator for LogStream<'_> {
    type Item = InspectResult<LogRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = match self.scan.next() {
            Some(Ok(Entry::Log(entry))) => entry,
            Some(Ok(_)) => return self.next(),
            Some(Err(e)) => {
                if let Some(scope) = self.scope.take() {
                    scope.fail(&e.to_string());
                }
                return Some(Err(e));
            }
            None => {
                self.finish();
                return None;
            }
        };

        let identity = self.idents.get(&entry.file_id).cloned();
        let decoded = self.classify(&entry, identity.as_deref());
        match decoded {
            Decoded::Document(_) => self.counts.documents += 1,
            Decoded::Index { .. } => self.counts.index += 1,
            Decoded::Unknown => self.counts.unknown += 1,
        }
        Some(Ok(LogRecord::new(entry, identity, decoded)))
    }
}
