//! Output handling for CLI
//!
//! Text mode prints one human-readable line per item. JSON mode prints one
//! JSON object per line, with BSON values in relaxed extended JSON.
//! Errors go to stdout in the active format so dumps stay parseable.

use std::io::{self, Write};

use bson::{Bson, Document};
use serde_json::{json, Value};

use super::errors::CliResult;
use crate::catalog::CatalogEntry;
use crate::engine::TableMetadata;
use crate::journal::{Decoded, LogRecord};
use crate::table::{IndexEntry, Record};

pub struct Output {
    json: bool,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    fn emit(&self, text: impl FnOnce() -> String, value: impl FnOnce() -> Value) -> CliResult<()> {
        let mut stdout = io::stdout().lock();
        if self.json {
            serde_json::to_writer(&mut stdout, &value())?;
            writeln!(stdout)?;
        } else {
            writeln!(stdout, "{}", text())?;
        }
        stdout.flush()?;
        Ok(())
    }

    pub fn heading(&self, title: &str) -> CliResult<()> {
        if self.json {
            return Ok(());
        }
        self.emit(|| format!("== {} ==", title), || Value::Null)
    }

    pub fn record(&self, table: &str, record: &Record) -> CliResult<()> {
        self.emit(
            || format!("{}: {}", record.key, record.document),
            || json!({ "table": table, "key": record.key, "document": document_json(&record.document) }),
        )
    }

    pub fn index_entry(&self, index: &str, entry: &IndexEntry) -> CliResult<()> {
        self.emit(
            || format!("{} -> {:?}", entry.key, entry.record_ids),
            || {
                json!({
                    "index": index,
                    "key": document_json(&entry.key.to_document()),
                    "record_ids": entry.record_ids,
                })
            },
        )
    }

    pub fn catalog_entry(&self, entry: &CatalogEntry) -> CliResult<()> {
        self.emit(
            || {
                let indexes: Vec<String> = entry
                    .indexes
                    .iter()
                    .map(|index| format!("{} {} -> {}", index.name, index.key_pattern, index.identity))
                    .collect();
                format!(
                    "{} -> {} (uuid {}, key {}) [{}]",
                    entry.namespace,
                    entry.identity,
                    entry.uuid,
                    entry.record_id,
                    indexes.join("; ")
                )
            },
            || {
                let indexes: Vec<Value> = entry
                    .indexes
                    .iter()
                    .map(|index| {
                        json!({
                            "name": index.name,
                            "key": document_json(&index.key_pattern.to_document()),
                            "unique": index.unique,
                            "ready": index.ready,
                            "ident": index.identity,
                            "multikey": index.multikey_paths.is_some(),
                        })
                    })
                    .collect();
                json!({
                    "key": entry.record_id,
                    "ns": entry.namespace,
                    "ident": entry.identity,
                    "uuid": entry.uuid.to_string(),
                    "indexes": indexes,
                })
            },
        )
    }

    pub fn metadata(&self, uri: &str, meta: &TableMetadata) -> CliResult<()> {
        self.emit(
            || format!("{}: {}", uri, meta.config()),
            || json!({ "uri": uri, "file_id": meta.file_id, "config": meta.config() }),
        )
    }

    pub fn statistic(&self, name: &str, value: i64) -> CliResult<()> {
        self.emit(
            || format!("{}={}", name, value),
            || json!({ "name": name, "value": value }),
        )
    }

    pub fn log_record(&self, record: &LogRecord) -> CliResult<()> {
        let ident = record.identity.as_deref().unwrap_or("-");
        self.emit(
            || {
                let decoded = match &record.decoded {
                    Decoded::Document(document) => document.to_string(),
                    Decoded::Index { namespace, index, entry } => {
                        format!("{}.{} {} -> {}", namespace, index, entry.key, entry.record_id)
                    }
                    Decoded::Unknown => format!(
                        "key={} value={}",
                        hex::encode(&record.raw_key),
                        hex::encode(&record.raw_value)
                    ),
                };
                format!(
                    "{} txn={} {} {} file={} ({}) {}",
                    record.lsn,
                    record.txn_id,
                    record.record_type.as_str(),
                    record.op_type.as_str(),
                    record.file_id,
                    ident,
                    decoded
                )
            },
            || {
                let decoded = match &record.decoded {
                    Decoded::Document(document) => json!({ "document": document_json(document) }),
                    Decoded::Index { namespace, index, entry } => json!({
                        "namespace": namespace,
                        "index": index,
                        "key": document_json(&entry.key.to_document()),
                        "record_id": entry.record_id,
                    }),
                    Decoded::Unknown => Value::Null,
                };
                json!({
                    "lsn": record.lsn,
                    "txn_id": record.txn_id,
                    "record_type": record.record_type.as_str(),
                    "op_type": record.op_type.as_str(),
                    "file_id": record.file_id,
                    "ident": record.identity,
                    "kind": record.decoded.label(),
                    "key": hex::encode(&record.raw_key),
                    "value": hex::encode(&record.raw_value),
                    "decoded": decoded,
                })
            },
        )
    }

    /// Reports a message such as "Record 3 inserted"
    pub fn message(&self, text: &str, value: Value) -> CliResult<()> {
        self.emit(|| text.to_string(), || value)
    }

    /// Reports a skipped entry or failed step without aborting
    pub fn error(&self, code: &str, message: &str) -> CliResult<()> {
        self.emit(
            || format!("Error: {}", message),
            || json!({ "status": "error", "code": code, "message": message }),
        )
    }
}

fn document_json(document: &Document) -> Value {
    Bson::Document(document.clone()).into_relaxed_extjson()
}
