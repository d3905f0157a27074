//! CatalogResolver: namespace ↔ identity ↔ index metadata

use std::collections::BTreeMap;
use std::sync::Arc;

use uuid::Uuid;

use super::entry::{CatalogEntry, IndexSpec};
use crate::engine::Connection;
use crate::errors::{InspectError, InspectResult};
use crate::keystring::{KeyCodec, NativeKeyCodec};
use crate::observability::{log_event_with_fields, Event};
use crate::table::{Entry, Kind, Record, TableAccessor};

/// Identity of the catalog table
pub const CATALOG_IDENT: &str = "_mdb_catalog";

/// A loaded catalog, keyed by identity
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl Catalog {
    /// Builds a catalog from already decoded entries
    pub fn from_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.identity.clone(), entry))
                .collect(),
        }
    }

    /// Returns the identity registered for `namespace`
    pub fn resolve(&self, namespace: &str) -> InspectResult<&str> {
        self.find_namespace(namespace)
            .map(|entry| entry.identity.as_str())
            .ok_or_else(|| {
                InspectError::not_found("namespace not found").with_details(namespace.to_string())
            })
    }

    pub fn entry(&self, identity: &str) -> Option<&CatalogEntry> {
        self.entries.get(identity)
    }

    pub fn find_namespace(&self, namespace: &str) -> Option<&CatalogEntry> {
        self.entries.values().find(|entry| entry.namespace == namespace)
    }

    /// Finds the collection and index owning an index table
    pub fn index_for_ident(&self, identity: &str) -> Option<(&CatalogEntry, &IndexSpec)> {
        self.entries.values().find_map(|entry| {
            entry
                .indexes
                .iter()
                .find(|index| index.identity == identity)
                .map(|index| (entry, index))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reads and mutates the persistent catalog
///
/// Every call reopens the catalog table; nothing is cached between calls.
/// Mutations become durable only after a checkpoint.
pub struct CatalogResolver<'c> {
    conn: &'c Connection,
    codec: Arc<dyn KeyCodec>,
}

impl<'c> CatalogResolver<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self {
            conn,
            codec: Arc::new(NativeKeyCodec),
        }
    }

    /// Creates the catalog table if the data directory has none.
    /// Returns true if it was created.
    pub fn initialize(conn: &Connection) -> InspectResult<bool> {
        let session = conn.open_session()?;
        let exists = session.table_exists(CATALOG_IDENT)?;
        session.close()?;
        if exists {
            return Ok(false);
        }
        TableAccessor::create(conn, CATALOG_IDENT)?;
        Ok(true)
    }

    fn open(&self) -> InspectResult<TableAccessor> {
        TableAccessor::open(self.conn, CATALOG_IDENT, Kind::Catalog, Arc::clone(&self.codec))
    }

    /// Loads every collection entry. Entries that fail to decode are
    /// logged and skipped.
    pub fn load(&self) -> InspectResult<Catalog> {
        let mut accessor = self.open()?;
        let mut catalog = Catalog::default();
        let mut skipped = 0usize;

        for item in accessor.scan_all() {
            let decoded = item.and_then(|entry| match entry {
                Entry::Record(Record { key, document }) => CatalogEntry::from_document(key, &document),
                _ => Ok(None),
            });
            match decoded {
                Ok(Some(entry)) => {
                    catalog.entries.insert(entry.identity.clone(), entry);
                }
                Ok(None) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    skipped += 1;
                    log_event_with_fields(
                        Event::EntrySkipped,
                        &[("error", &e.to_string()), ("ident", CATALOG_IDENT)],
                    );
                }
            }
        }
        accessor.close()?;

        log_event_with_fields(
            Event::CatalogLoaded,
            &[
                ("entries", &catalog.len().to_string()),
                ("skipped", &skipped.to_string()),
            ],
        );
        Ok(catalog)
    }

    /// Resolves a namespace against a fresh load of the catalog
    pub fn resolve(&self, namespace: &str) -> InspectResult<String> {
        self.load()?.resolve(namespace).map(str::to_string)
    }

    /// Adds a collection entry with no indexes
    ///
    /// The whole catalog is scanned before anything is written: an entry
    /// with the same namespace or identity fails `AlreadyExists`, and an
    /// entry that cannot be decoded aborts the register. The new entry is
    /// stored under `max(existing keys) + 1`, or 0 for an empty catalog.
    pub fn register(&self, namespace: &str, identity: &str, uuid: Uuid) -> InspectResult<CatalogEntry> {
        let mut accessor = self.open()?;
        let mut max_key: Option<i64> = None;

        for item in accessor.scan_all() {
            let Entry::Record(record) = item? else {
                continue;
            };
            max_key = Some(max_key.map_or(record.key, |m| m.max(record.key)));

            let Some(existing) = CatalogEntry::from_document(record.key, &record.document)
                .map_err(|e| e.with_details(format!("catalog key {}", record.key)))?
            else {
                continue;
            };
            if existing.namespace == namespace {
                return Err(InspectError::already_exists("namespace already registered")
                    .with_details(format!("{} -> {}", namespace, existing.identity)));
            }
            if existing.identity == identity {
                return Err(InspectError::already_exists("identity already registered")
                    .with_details(format!("{} -> {}", identity, existing.namespace)));
            }
        }

        let entry = CatalogEntry {
            record_id: max_key.map_or(0, |m| m + 1),
            identity: identity.to_string(),
            namespace: namespace.to_string(),
            uuid,
            indexes: Vec::new(),
        };
        accessor.insert(entry.record_id, &entry.to_document())?;
        accessor.close()?;

        log_event_with_fields(
            Event::CollectionRegistered,
            &[
                ("ident", identity),
                ("key", &entry.record_id.to_string()),
                ("namespace", namespace),
            ],
        );
        Ok(entry)
    }

    /// Removes the entry for `identity`
    pub fn unregister(&self, identity: &str) -> InspectResult<CatalogEntry> {
        let mut accessor = self.open()?;
        let mut found = None;

        for item in accessor.scan_all() {
            let decoded = item.and_then(|entry| match entry {
                Entry::Record(Record { key, document }) => CatalogEntry::from_document(key, &document),
                _ => Ok(None),
            });
            match decoded {
                Ok(Some(entry)) if entry.identity == identity => {
                    found = Some(entry);
                    break;
                }
                Ok(_) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => log_event_with_fields(
                    Event::EntrySkipped,
                    &[("error", &e.to_string()), ("ident", CATALOG_IDENT)],
                ),
            }
        }

        let entry = found.ok_or_else(|| {
            InspectError::not_found("identity not registered").with_details(identity.to_string())
        })?;
        accessor.delete(entry.record_id)?;
        accessor.close()?;

        log_event_with_fields(
            Event::CollectionUnregistered,
            &[("ident", identity), ("namespace", &entry.namespace)],
        );
        Ok(entry)
    }

    /// Creates a collection table and registers it under `namespace`
    ///
    /// If registering fails the table is dropped again.
    pub fn create_collection(&self, namespace: &str, identity: &str) -> InspectResult<CatalogEntry> {
        if let Some(existing) = self.load()?.find_namespace(namespace) {
            return Err(InspectError::already_exists("namespace already registered")
                .with_details(format!("{} -> {}", namespace, existing.identity)));
        }

        TableAccessor::create(self.conn, identity)?;
        match self.register(namespace, identity, Uuid::new_v4()) {
            Ok(entry) => Ok(entry),
            Err(e) => {
                if let Err(drop_err) = TableAccessor::drop(self.conn, identity) {
                    log_event_with_fields(
                        Event::EntrySkipped,
                        &[("error", &drop_err.to_string()), ("ident", identity)],
                    );
                }
                Err(e)
            }
        }
    }

    /// Unregisters `namespace` and drops its collection and index tables
    pub fn drop_collection(&self, namespace: &str) -> InspectResult<CatalogEntry> {
        let catalog = self.load()?;
        let identity = catalog.resolve(namespace)?.to_string();
        let entry = self.unregister(&identity)?;

        let session = self.conn.open_session()?;
        let mut idents = vec![entry.identity.clone()];
        idents.extend(entry.indexes.iter().map(|index| index.identity.clone()));
        let mut existing = Vec::with_capacity(idents.len());
        for ident in idents {
            if session.table_exists(&ident)? {
                existing.push(ident);
            }
        }
        session.close()?;

        for ident in existing {
            TableAccessor::drop(self.conn, &ident)?;
        }
        Ok(entry)
    }
}

/// Generates a fresh table identity such as `collection-3f2a...`
pub fn generate_identity(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> Connection {
        let config = EngineConfig {
            create: true,
            ..EngineConfig::default()
        };
        let conn = Connection::open(dir.path(), &config).unwrap();
        CatalogResolver::initialize(&conn).unwrap();
        conn
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let conn = open(&dir);
        assert!(!CatalogResolver::initialize(&conn).unwrap());
    }

    #[test]
    fn test_register_assigns_max_plus_one() {
        let dir = TempDir::new().unwrap();
        let conn = open(&dir);
        let resolver = CatalogResolver::new(&conn);

        let a = resolver.register("db.a", "collection-a", Uuid::new_v4()).unwrap();
        let b = resolver.register("db.b", "collection-b", Uuid::new_v4()).unwrap();
        assert_eq!(a.record_id, 0);
        assert_eq!(b.record_id, 1);
        assert_eq!(resolver.resolve("db.b").unwrap(), "collection-b");
    }

    #[test]
    fn test_register_rejects_duplicate_identity() {
        let dir = TempDir::new().unwrap();
        let conn = open(&dir);
        let resolver = CatalogResolver::new(&conn);
        resolver.register("db.a", "collection-a", Uuid::new_v4()).unwrap();

        let err = resolver
            .register("db.other", "collection-a", Uuid::new_v4())
            .unwrap_err();
        assert!(err.is_already_exists());
    }

    #[test]
    fn test_unregister_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let conn = open(&dir);
        let err = CatalogResolver::new(&conn).unregister("nope").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_generate_identity_is_unique() {
        let a = generate_identity("collection");
        let b = generate_identity("collection");
        assert!(a.starts_with("collection-"));
        assert_ne!(a, b);
    }
}
