//! Catalog entries and their BSON layout
//!
//! ```text
//! {
//!   md: {
//!     ns: "db.users",
//!     options: { uuid: BinData(4, ...) },
//!     indexes: [
//!       { spec: { v: 2, key: { _id: 1 }, name: "_id_" }, ready: true, multikey: false },
//!       ...
//!     ]
//!   },
//!   ns: "db.users",
//!   ident: "collection-2",
//!   idxIdent: { _id_: "index-3", ... }
//! }
//! ```
//!
//! Documents without `md` describe engine features, not collections.

use bson::spec::BinarySubtype;
use bson::{doc, Binary, Bson, Document};
use uuid::Uuid;

use crate::errors::{InspectError, InspectResult};
use crate::keystring::KeyPattern;

/// One index of a collection
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub name: String,
    pub key_pattern: KeyPattern,
    pub unique: bool,
    pub ready: bool,
    /// Physical table holding the index entries
    pub identity: String,
    pub multikey_paths: Option<Document>,
}

impl IndexSpec {
    pub fn new(name: impl Into<String>, key_pattern: KeyPattern, identity: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_pattern,
            unique: false,
            ready: true,
            identity: identity.into(),
            multikey_paths: None,
        }
    }

    fn from_document(doc: &Document, idx_idents: Option<&Document>) -> InspectResult<Self> {
        let spec = doc
            .get_document("spec")
            .map_err(|_| missing_field("md.indexes.spec"))?;
        let name = spec
            .get_str("name")
            .map_err(|_| missing_field("md.indexes.spec.name"))?;
        let key = spec
            .get_document("key")
            .map_err(|_| missing_field("md.indexes.spec.key"))?;
        let identity = idx_idents
            .and_then(|idents| idents.get_str(name).ok())
            .ok_or_else(|| {
                InspectError::decode("index has no identity").with_details(format!("idxIdent.{}", name))
            })?;

        Ok(Self {
            name: name.to_string(),
            key_pattern: KeyPattern::from_document(key),
            unique: spec.get_bool("unique").unwrap_or(false),
            ready: doc.get_bool("ready").unwrap_or(false),
            identity: identity.to_string(),
            multikey_paths: doc.get_document("multikeyPaths").ok().cloned(),
        })
    }

    fn to_document(&self) -> Document {
        let mut spec = doc! {
            "v": 2,
            "key": self.key_pattern.to_document(),
            "name": self.name.clone(),
        };
        if self.unique {
            spec.insert("unique", true);
        }
        let mut out = doc! {
            "spec": spec,
            "ready": self.ready,
            "multikey": self.multikey_paths.is_some(),
        };
        if let Some(paths) = &self.multikey_paths {
            out.insert("multikeyPaths", paths.clone());
        }
        out
    }
}

/// One logical collection
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    /// Key of this entry in the catalog table
    pub record_id: i64,
    pub identity: String,
    pub namespace: String,
    pub uuid: Uuid,
    pub indexes: Vec<IndexSpec>,
}

impl CatalogEntry {
    /// Decodes a catalog document; `Ok(None)` for non-collection documents
    pub fn from_document(record_id: i64, doc: &Document) -> InspectResult<Option<Self>> {
        let md = match doc.get("md") {
            None => return Ok(None),
            Some(Bson::Document(md)) => md,
            Some(_) => return Err(InspectError::decode("catalog md is not a document")),
        };

        let namespace = md
            .get_str("ns")
            .or_else(|_| doc.get_str("ns"))
            .map_err(|_| missing_field("md.ns"))?;
        let identity = doc.get_str("ident").map_err(|_| missing_field("ident"))?;
        let uuid = Self::parse_uuid(md)?;

        let idx_idents = doc.get_document("idxIdent").ok();
        let indexes = match md.get_array("indexes") {
            Ok(items) => items
                .iter()
                .map(|item| match item {
                    Bson::Document(index) => IndexSpec::from_document(index, idx_idents),
                    _ => Err(InspectError::decode("catalog index is not a document")),
                })
                .collect::<InspectResult<Vec<_>>>()?,
            Err(_) => Vec::new(),
        };

        Ok(Some(Self {
            record_id,
            identity: identity.to_string(),
            namespace: namespace.to_string(),
            uuid,
            indexes,
        }))
    }

    fn parse_uuid(md: &Document) -> InspectResult<Uuid> {
        let Ok(options) = md.get_document("options") else {
            return Ok(Uuid::nil());
        };
        match options.get("uuid") {
            None => Ok(Uuid::nil()),
            Some(Bson::Binary(Binary {
                subtype: BinarySubtype::Uuid,
                bytes,
            })) => Uuid::from_slice(bytes).map_err(|e| {
                InspectError::decode("catalog uuid is not 16 bytes").with_source(e)
            }),
            Some(_) => Err(InspectError::decode("catalog uuid is not a UUID binary")),
        }
    }

    /// Encodes the entry in catalog layout
    pub fn to_document(&self) -> Document {
        let uuid = Binary {
            subtype: BinarySubtype::Uuid,
            bytes: self.uuid.as_bytes().to_vec(),
        };
        let indexes: Vec<Bson> = self
            .indexes
            .iter()
            .map(|index| Bson::Document(index.to_document()))
            .collect();
        let mut idx_ident = Document::new();
        for index in &self.indexes {
            idx_ident.insert(index.name.clone(), index.identity.clone());
        }

        doc! {
            "md": {
                "ns": self.namespace.clone(),
                "options": { "uuid": uuid },
                "indexes": indexes,
            },
            "ns": self.namespace.clone(),
            "ident": self.identity.clone(),
            "idxIdent": idx_ident,
        }
    }

    pub fn index(&self, name: &str) -> Option<&IndexSpec> {
        self.indexes.iter().find(|index| index.name == name)
    }
}

fn missing_field(path: &str) -> InspectError {
    InspectError::decode("catalog entry missing field").with_details(path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystring::Direction;

    fn sample() -> CatalogEntry {
        let mut by_name = IndexSpec::new(
            "name_1_age_-1",
            KeyPattern::new(vec![
                ("name".to_string(), Direction::Ascending),
                ("age".to_string(), Direction::Descending),
            ]),
            "index-5",
        );
        by_name.unique = true;
        let mut tags = IndexSpec::new("tags_1", KeyPattern::ascending(&["tags"]), "index-6");
        let paths = Binary {
            subtype: BinarySubtype::Generic,
            bytes: vec![1],
        };
        tags.multikey_paths = Some(doc! { "tags": paths });

        CatalogEntry {
            record_id: 4,
            identity: "collection-4".to_string(),
            namespace: "db.users".to_string(),
            uuid: Uuid::from_bytes([9; 16]),
            indexes: vec![
                IndexSpec::new("_id_", KeyPattern::id(), "index-4"),
                by_name,
                tags,
            ],
        }
    }

    #[test]
    fn test_document_layout_decodes_back() {
        let entry = sample();
        let doc = entry.to_document();
        assert_eq!(doc.get_str("ident").unwrap(), "collection-4");
        assert_eq!(
            doc.get_document("idxIdent").unwrap().get_str("tags_1").unwrap(),
            "index-6"
        );

        let decoded = CatalogEntry::from_document(4, &doc).unwrap().unwrap();
        assert_eq!(decoded, entry);
        assert!(decoded.index("name_1_age_-1").unwrap().unique);
    }

    #[test]
    fn test_feature_documents_are_skipped() {
        let feature = doc! { "isFeatureDoc": true, "ns": null };
        assert_eq!(CatalogEntry::from_document(0, &feature).unwrap(), None);
    }

    #[test]
    fn test_missing_uuid_is_nil() {
        let doc = doc! { "md": { "ns": "db.a" }, "ident": "collection-1" };
        let entry = CatalogEntry::from_document(1, &doc).unwrap().unwrap();
        assert!(entry.uuid.is_nil());
        assert!(entry.indexes.is_empty());
    }

    #[test]
    fn test_malformed_entries_are_decode_errors() {
        let no_ident = doc! { "md": { "ns": "db.a" } };
        assert!(CatalogEntry::from_document(1, &no_ident).unwrap_err().is_decode());

        let short = Binary {
            subtype: BinarySubtype::Uuid,
            bytes: vec![1, 2],
        };
        let short_uuid = doc! {
            "md": { "ns": "db.a", "options": { "uuid": short } },
            "ident": "collection-1",
        };
        assert!(CatalogEntry::from_document(1, &short_uuid).unwrap_err().is_decode());

        let orphan_index = doc! {
            "md": { "ns": "db.a", "indexes": [{ "spec": { "key": { "a": 1 }, "name": "a_1" } }] },
            "ident": "collection-1",
        };
        assert!(CatalogEntry::from_document(1, &orphan_index).unwrap_err().is_decode());
    }
}
