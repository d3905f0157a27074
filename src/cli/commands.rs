//! CLI command implementations
//!
//! Every command opens one connection, does its work, and closes the
//! connection again. Commands that only read open it read-only, which also
//! keeps them from starting a new log file.
//!
//! Failing to connect, or a namespace that is malformed or unregistered,
//! fails the whole command. Any other error is reported on stdout and the
//! offending record or scan is skipped.

use std::path::Path;
use std::sync::Arc;

use bson::oid::ObjectId;
use bson::{doc, Bson, Document};
use serde_json::{json, Value};

use super::args::{Cli, Command};
use super::config::Config;
use super::errors::{CliError, CliResult};
use super::io::Output;
use crate::catalog::{generate_identity, Catalog, CatalogEntry, CatalogResolver, CATALOG_IDENT};
use crate::checkpoint::CheckpointCoordinator;
use crate::engine::Connection;
use crate::errors::{InspectError, InspectResult};
use crate::keystring::KeyCodec;
use crate::journal::LogReader;
use crate::observability::{log_event_with_fields, Event, Logger};
use crate::table::{Entry, Kind, TableAccessor};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    run_with(Cli::parse_args())
}

/// Runs already parsed arguments
pub fn run_with(cli: Cli) -> CliResult<()> {
    let config = match &cli.config {
        Some(path) => {
            let config = Config::load(path)?;
            log_event_with_fields(Event::ConfigLoaded, &[("path", &path.display().to_string())]);
            config
        }
        None => Config::default(),
    };
    Logger::set_min_severity(config.severity()?);

    let data_dir = cli
        .command
        .data_dir()
        .cloned()
        .unwrap_or_else(|| config.data_path());
    let out = Output::new(cli.json);
    run_command(&cli.command, &config, &data_dir, &out)
}

pub fn run_command(cmd: &Command, config: &Config, data_dir: &Path, out: &Output) -> CliResult<()> {
    if let Command::Dump { namespace, .. } | Command::Create { namespace, .. } | Command::Drop { namespace, .. } = cmd {
        validate_namespace(namespace)?;
    }

    let conn = connect(config, data_dir, cmd)?;
    let codec = config.key_codec();

    let result = match cmd {
        Command::Dump { namespace, insert, .. } => dump(&conn, &codec, namespace, insert, out),
        Command::Catalog { .. } => catalog(&conn, out),
        Command::Metadata { .. } => metadata(&conn, &codec, out),
        Command::Log { last, .. } => log(&conn, &codec, *last, out),
        Command::Stats { table, .. } => stats(&conn, &codec, table.as_deref(), out),
        Command::Create { namespace, ident, .. } => create(&conn, namespace, ident.as_deref(), out),
        Command::Drop { namespace, .. } => drop_collection(&conn, namespace, out),
        Command::Checkpoint { .. } => checkpoint(&conn, out),
    };

    // Report the command's own error over a close failure
    let closed = conn.close();
    result?;
    closed?;
    Ok(())
}

fn connect(config: &Config, data_dir: &Path, cmd: &Command) -> CliResult<Connection> {
    let mut engine = config.engine_config(matches!(cmd, Command::Create { .. }));
    if !cmd.mutates() {
        engine.readonly = true;
    }

    Connection::open(data_dir, &engine).map_err(|e| {
        log_event_with_fields(
            Event::ConnectionFailed,
            &[("data_dir", &data_dir.display().to_string()), ("error", &e.to_string())],
        );
        CliError::boot_failed(e.to_string())
    })
}

/// Checks the `database.collection` shape
pub fn validate_namespace(namespace: &str) -> CliResult<()> {
    match namespace.split_once('.') {
        Some((db, coll)) if !db.is_empty() && !coll.is_empty() && !db.contains(['/', '\\', ' ', '$']) => Ok(()),
        _ => Err(CliError::usage_error(format!(
            "invalid namespace '{}': expected <database>.<collection>",
            namespace
        ))),
    }
}

/// Reports a non-fatal error and carries on; fatal ones abort
fn report(out: &Output, e: InspectError) -> CliResult<()> {
    if e.is_fatal() {
        return Err(e.into());
    }
    out.error(e.code().code(), &e.to_string())
}

fn resolve(conn: &Connection, namespace: &str) -> CliResult<CatalogEntry> {
    let catalog = CatalogResolver::new(conn).load()?;
    let identity = catalog.resolve(namespace)?;
    catalog
        .entry(identity)
        .cloned()
        .ok_or_else(|| CliError::from(InspectError::not_found("namespace not found").with_details(namespace.to_string())))
}

/// Parses an `--insert` argument: JSON scalars keep their type, anything
/// else is stored as a string
pub fn parse_scalar(raw: &str) -> Bson {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_))) => {
            Bson::try_from(value).unwrap_or_else(|_| Bson::String(raw.to_string()))
        }
        _ => Bson::String(raw.to_string()),
    }
}

fn dump(
    conn: &Connection,
    codec: &Arc<dyn KeyCodec>,
    namespace: &str,
    inserts: &[String],
    out: &Output,
) -> CliResult<()> {
    let entry = resolve(conn, namespace)?;

    if !inserts.is_empty() {
        let outcomes = CheckpointCoordinator::new(conn)
            .run(|conn| insert_values(conn, codec, &entry, inserts))?;
        for outcome in outcomes {
            match outcome {
                Ok(key) => out.message(
                    &format!("Record {} inserted", key),
                    json!({ "inserted": key, "table": entry.identity }),
                )?,
                Err(e) => report(out, e)?,
            }
        }
    }

    out.heading(&format!("{} ({})", entry.namespace, entry.identity))?;
    let mut collection = TableAccessor::open(conn, &entry.identity, Kind::Collection, Arc::clone(codec))?;
    for item in collection.scan_all() {
        match item {
            Ok(Entry::Record(record)) => out.record(&entry.identity, &record)?,
            Ok(_) => {}
            Err(e) => report(out, e)?,
        }
    }
    collection.close()?;

    for index in &entry.indexes {
        out.heading(&format!("index {} {} ({})", index.name, index.key_pattern, index.identity))?;
        let kind = Kind::Index(index.key_pattern.clone());
        let mut accessor = match TableAccessor::open(conn, &index.identity, kind, Arc::clone(codec)) {
            Ok(accessor) => accessor,
            Err(e) => {
                out.error(e.code().code(), &e.to_string())?;
                continue;
            }
        };
        for item in accessor.scan_all() {
            match item {
                Ok(Entry::Index(index_entry)) => out.index_entry(&index.name, &index_entry)?,
                Ok(_) => {}
                Err(e) => report(out, e)?,
            }
        }
        accessor.close()?;
    }
    Ok(())
}

/// Inserts `{_id: <new ObjectId>, value: <scalar>}` documents under fresh
/// keys and writes their index entries. Returns one outcome per value.
fn insert_values(
    conn: &Connection,
    codec: &Arc<dyn KeyCodec>,
    entry: &CatalogEntry,
    inserts: &[String],
) -> InspectResult<Vec<InspectResult<i64>>> {
    let mut collection = TableAccessor::open(conn, &entry.identity, Kind::Collection, Arc::clone(codec))?;
    let mut outcomes = Vec::with_capacity(inserts.len());

    for raw in inserts {
        let document = doc! { "_id": ObjectId::new(), "value": parse_scalar(raw) };
        let outcome = collection.new_key().and_then(|key| {
            collection.insert(key, &document)?;
            index_values(conn, codec, entry, &document, key)?;
            Ok(key)
        });
        match outcome {
            Err(e) if e.is_fatal() => return Err(e),
            outcome => outcomes.push(outcome),
        }
    }
    collection.close()?;
    Ok(outcomes)
}

fn index_values(
    conn: &Connection,
    codec: &Arc<dyn KeyCodec>,
    entry: &CatalogEntry,
    document: &Document,
    key: i64,
) -> InspectResult<()> {
    for index in &entry.indexes {
        let kind = Kind::Index(index.key_pattern.clone());
        let mut accessor = TableAccessor::open(conn, &index.identity, kind, Arc::clone(codec))?;
        accessor.index_document(document, key)?;
        accessor.close()?;
    }
    Ok(())
}

fn catalog(conn: &Connection, out: &Output) -> CliResult<()> {
    out.heading(CATALOG_IDENT)?;
    let catalog = CatalogResolver::new(conn).load()?;
    for entry in catalog.iter() {
        out.catalog_entry(entry)?;
    }
    Ok(())
}

fn metadata(conn: &Connection, codec: &Arc<dyn KeyCodec>, out: &Output) -> CliResult<()> {
    let mut accessor = TableAccessor::open(conn, "", Kind::Metadata, Arc::clone(codec))?;
    for item in accessor.scan_all() {
        match item {
            Ok(Entry::Metadata { uri, meta }) => out.metadata(&uri, &meta)?,
            Ok(_) => {}
            Err(e) => report(out, e)?,
        }
    }
    accessor.close()?;
    Ok(())
}

fn log(conn: &Connection, codec: &Arc<dyn KeyCodec>, last: bool, out: &Output) -> CliResult<()> {
    let session = conn.open_session()?;
    let has_catalog = session.table_exists(CATALOG_IDENT)?;
    session.close()?;
    let catalog = if has_catalog {
        CatalogResolver::new(conn).load()?
    } else {
        Catalog::default()
    };

    let mut reader = LogReader::open(conn, &catalog, Arc::clone(codec))?;
    if last {
        match reader.last_transaction() {
            Ok(records) => {
                for record in &records {
                    out.log_record(record)?;
                }
            }
            Err(e) => out.error(e.code().code(), &e.to_string())?,
        }
    } else {
        for item in reader.stream() {
            match item {
                Ok(record) => out.log_record(&record)?,
                // A corrupt frame ends the stream; report it and stop
                Err(e) => out.error(e.code().code(), &e.to_string())?,
            }
        }
    }
    reader.close()?;
    Ok(())
}

fn stats(conn: &Connection, codec: &Arc<dyn KeyCodec>, table: Option<&str>, out: &Output) -> CliResult<()> {
    let mut accessor = TableAccessor::open(conn, table.unwrap_or(""), Kind::Statistics, Arc::clone(codec))?;
    for item in accessor.scan_all() {
        match item {
            Ok(Entry::Statistic { name, value }) => out.statistic(&name, value)?,
            Ok(_) => {}
            Err(e) => report(out, e)?,
        }
    }
    accessor.close()?;
    Ok(())
}

fn create(conn: &Connection, namespace: &str, ident: Option<&str>, out: &Output) -> CliResult<()> {
    let identity = ident
        .map(str::to_string)
        .unwrap_or_else(|| generate_identity("collection"));

    let entry = CheckpointCoordinator::new(conn).run(|conn| {
        CatalogResolver::initialize(conn)?;
        CatalogResolver::new(conn).create_collection(namespace, &identity)
    })?;
    out.message(
        &format!("Collection {} created as {} (key {})", entry.namespace, entry.identity, entry.record_id),
        json!({ "created": entry.namespace, "ident": entry.identity, "key": entry.record_id }),
    )
}

fn drop_collection(conn: &Connection, namespace: &str, out: &Output) -> CliResult<()> {
    let entry = CheckpointCoordinator::new(conn)
        .run(|conn| CatalogResolver::new(conn).drop_collection(namespace))?;
    out.message(
        &format!("Collection {} dropped ({})", entry.namespace, entry.identity),
        json!({ "dropped": entry.namespace, "ident": entry.identity }),
    )
}

fn checkpoint(conn: &Connection, out: &Output) -> CliResult<()> {
    let marker = CheckpointCoordinator::new(conn).checkpoint()?;
    let lsn = marker.lsn.map(|lsn| lsn.to_string()).unwrap_or_else(|| "-".to_string());
    out.message(
        &format!(
            "Checkpoint {} at {} (lsn {}, {} tables written)",
            marker.checkpoint_id, marker.created_at, lsn, marker.tables_written
        ),
        serde_json::to_value(&marker)?,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_namespace() {
        assert!(validate_namespace("db.users").is_ok());
        assert!(validate_namespace("db.system.views").is_ok());
        for bad in ["users", ".users", "db.", "my db.users", ""] {
            let err = validate_namespace(bad).unwrap_err();
            assert_eq!(err.code_str(), "SCOPE_CLI_USAGE_ERROR", "{}", bad);
        }
    }

    #[test]
    fn test_parse_scalar() {
        assert_eq!(parse_scalar("42"), Bson::Int32(42));
        assert_eq!(parse_scalar("5000000000"), Bson::Int64(5_000_000_000));
        assert_eq!(parse_scalar("1.5"), Bson::Double(1.5));
        assert_eq!(parse_scalar("true"), Bson::Boolean(true));
        assert_eq!(parse_scalar("null"), Bson::Null);
        assert_eq!(parse_scalar("\"quoted\""), Bson::String("quoted".to_string()));
        assert_eq!(parse_scalar("plain"), Bson::String("plain".to_string()));
        assert_eq!(parse_scalar("{\"a\": 1}"), Bson::String("{\"a\": 1}".to_string()));
    }
}
