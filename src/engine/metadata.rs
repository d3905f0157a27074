//! Engine metadata namespace
//!
//! One entry per table, keyed by `table:<ident>`. The value is a flat
//! configuration string in the engine's `key=value,...` syntax:
//!
//! ```text
//! id=7,key_format=q,value_format=u,block_compressor=,log=(enabled=true),...
//! ```
//!
//! Only `id` and `key_format` carry meaning here; the remaining settings
//! are written for compatibility with tools that expect them.

use std::fmt;

use regex::Regex;

use crate::errors::{InspectError, InspectResult};

pub const TABLE_URI_PREFIX: &str = "table:";

/// File id of the metadata table itself
pub const METADATA_FILE_ID: u32 = 0;
/// File id reserved for checkpoint log records
pub const CHECKPOINT_FILE_ID: u32 = 2;
/// First file id handed to user tables
pub const FIRST_TABLE_FILE_ID: u32 = 3;

/// How a table's keys are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    /// 64-bit signed record ids (`q`)
    Record,
    /// Arbitrary byte strings (`u`)
    Raw,
}

impl KeyFormat {
    pub fn as_config(&self) -> &'static str {
        match self {
            KeyFormat::Record => "q",
            KeyFormat::Raw => "u",
        }
    }

    fn from_config(value: &str) -> Option<Self> {
        match value {
            "q" => Some(KeyFormat::Record),
            "u" => Some(KeyFormat::Raw),
            _ => None,
        }
    }
}

impl fmt::Display for KeyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_config())
    }
}

/// Parsed metadata of one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMetadata {
    pub ident: String,
    pub file_id: u32,
    pub key_format: KeyFormat,
    config: String,
}

impl TableMetadata {
    pub fn new(ident: impl Into<String>, file_id: u32, key_format: KeyFormat) -> Self {
        let config = format!(
            "id={},key_format={},value_format=u,block_compressor=,log=(enabled=true),\
             prefix_compression=false,memory_page_max=5MB,leaf_page_max=32KB,\
             leaf_value_max=64MB",
            file_id,
            key_format.as_config()
        );
        Self {
            ident: ident.into(),
            file_id,
            key_format,
            config,
        }
    }

    /// Parses a metadata entry
    pub fn parse(uri: &str, config: &str) -> InspectResult<Self> {
        let ident = uri.strip_prefix(TABLE_URI_PREFIX).ok_or_else(|| {
            InspectError::engine("metadata key is not a table uri").with_details(uri.to_string())
        })?;

        let id_pattern = Regex::new(r"(?:^|,)id=(\d+)")
            .map_err(|e| InspectError::engine("invalid metadata pattern").with_source(e))?;
        let format_pattern = Regex::new(r"(?:^|,)key_format=(\w+)")
            .map_err(|e| InspectError::engine("invalid metadata pattern").with_source(e))?;

        let file_id = id_pattern
            .captures(config)
            .and_then(|c| c[1].parse::<u32>().ok())
            .ok_or_else(|| {
                InspectError::engine("metadata entry has no file id").with_details(uri.to_string())
            })?;
        let key_format = format_pattern
            .captures(config)
            .and_then(|c| KeyFormat::from_config(&c[1]))
            .ok_or_else(|| {
                InspectError::engine("metadata entry has no valid key format")
                    .with_details(uri.to_string())
            })?;

        Ok(Self {
            ident: ident.to_string(),
            file_id,
            key_format,
            config: config.to_string(),
        })
    }

    pub fn uri(&self) -> String {
        format!("{}{}", TABLE_URI_PREFIX, self.ident)
    }

    pub fn config(&self) -> &str {
        &self.config
    }

    /// Name of the table's data file
    pub fn file_name(&self) -> String {
        format!("{}.tbl", self.ident)
    }
}

/// Rejects identities that cannot safely name a file
pub(crate) fn validate_ident(ident: &str) -> InspectResult<()> {
    let pattern = Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.\-]*$")
        .map_err(|e| InspectError::engine("invalid ident pattern").with_source(e))?;
    if !pattern.is_match(ident) || ident == "metadata" {
        return Err(InspectError::engine("invalid table identity").with_details(ident.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_string_parses_back() {
        let meta = TableMetadata::new("collection-4", 7, KeyFormat::Record);
        assert!(meta.config().starts_with("id=7,key_format=q,value_format=u"));

        let parsed = TableMetadata::parse(&meta.uri(), meta.config()).unwrap();
        assert_eq!(parsed, meta);
        assert_eq!(parsed.file_name(), "collection-4.tbl");
    }

    #[test]
    fn test_parse_ignores_similar_keys() {
        let parsed = TableMetadata::parse(
            "table:index-1",
            "checkpoint_id=99,id=12,key_format=u,value_format=u",
        )
        .unwrap();
        assert_eq!(parsed.file_id, 12);
        assert_eq!(parsed.key_format, KeyFormat::Raw);
    }

    #[test]
    fn test_parse_rejects_malformed_entries() {
        assert!(TableMetadata::parse("file:x.wt", "id=1,key_format=q").is_err());
        assert!(TableMetadata::parse("table:x", "key_format=q").unwrap_err().is_engine());
        assert!(TableMetadata::parse("table:x", "id=1,key_format=S").is_err());
    }

    #[test]
    fn test_validate_ident() {
        assert!(validate_ident("collection-0-123").is_ok());
        assert!(validate_ident("_mdb_catalog").is_ok());
        assert!(validate_ident("../escape").is_err());
        assert!(validate_ident("a/b").is_err());
        assert!(validate_ident("").is_err());
        assert!(validate_ident("metadata").is_err());
    }
}
