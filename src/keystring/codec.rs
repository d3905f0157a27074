//! Pluggable index key decoding
//!
//! [`NativeKeyCodec`] decodes in-process. [`ExternalKeyCodec`] shells out
//! to a helper program for key formats this crate does not understand:
//!
//! ```text
//! <program> [leading args] -o <format> -p <pattern json> -t <value hex> -r long <key hex>
//! ```
//!
//! The helper prints one line: one JSON value per pattern field followed by
//! the record id, all separated by commas.

use std::path::{Path, PathBuf};
use std::process::Command;

use bson::Bson;
use regex::Regex;

use super::decode::decode_entry;
use super::errors::KeyStringError;
use super::key::KeyString;
use super::pattern::KeyPattern;
use crate::errors::{InspectError, InspectResult};

/// An index key together with the record it points at
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedKey {
    pub key: KeyString,
    pub record_id: i64,
}

/// Decodes raw index table entries
pub trait KeyCodec: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    fn decode(
        &self,
        raw_key: &[u8],
        raw_value: &[u8],
        pattern: &KeyPattern,
    ) -> InspectResult<DecodedKey>;
}

/// In-process decoder for the native KeyString format
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeKeyCodec;

impl KeyCodec for NativeKeyCodec {
    fn name(&self) -> &str {
        "native"
    }

    fn decode(
        &self,
        raw_key: &[u8],
        raw_value: &[u8],
        pattern: &KeyPattern,
    ) -> InspectResult<DecodedKey> {
        let (key, record_id) = decode_entry(raw_key, raw_value, pattern)?;
        Ok(DecodedKey { key, record_id })
    }
}

/// Decoder backed by an external helper program
#[derive(Debug, Clone)]
pub struct ExternalKeyCodec {
    program: PathBuf,
    leading_args: Vec<String>,
    format: String,
}

impl ExternalKeyCodec {
    pub fn new(program: impl Into<PathBuf>, format: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            format: format.into(),
        }
    }

    /// Arguments placed before the standard ones (e.g. a script path)
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn format(&self) -> &str {
        &self.format
    }
}

impl KeyCodec for ExternalKeyCodec {
    fn name(&self) -> &str {
        "external"
    }

    fn decode(
        &self,
        raw_key: &[u8],
        raw_value: &[u8],
        pattern: &KeyPattern,
    ) -> InspectResult<DecodedKey> {
        let output = Command::new(&self.program)
            .args(&self.leading_args)
            .arg("-o")
            .arg(&self.format)
            .arg("-p")
            .arg(pattern.to_json())
            .arg("-t")
            .arg(hex::encode(raw_value))
            .arg("-r")
            .arg("long")
            .arg(hex::encode(raw_key))
            .output()
            .map_err(|e| {
                InspectError::decode("failed to run key helper")
                    .with_details(self.program.display().to_string())
                    .with_source(e)
            })?;

        if !output.status.success() {
            return Err(InspectError::decode("key helper exited with failure").with_details(
                format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_helper_output(&stdout, pattern)?)
    }
}

/// Parses `<value>,<value>,...,<record id>` helper output
///
/// Values may themselves contain commas (strings, objects, arrays), so the
/// record id is split off the end and the values are read as a JSON stream.
pub(crate) fn parse_helper_output(
    output: &str,
    pattern: &KeyPattern,
) -> Result<DecodedKey, KeyStringError> {
    let line = output.trim();
    if line.is_empty() {
        return Err(KeyStringError::HelperOutput("empty output".to_string()));
    }
    let (values, rid_token) = line
        .rsplit_once(',')
        .ok_or_else(|| KeyStringError::HelperOutput(format!("no record id in '{}'", line)))?;
    let record_id = parse_record_id(rid_token.trim())?;

    let values = if pattern.len() == 1 {
        vec![parse_field_value(values.trim())]
    } else {
        split_field_values(values)
    };

    if values.len() != pattern.len() {
        return Err(KeyStringError::HelperOutput(format!(
            "expected {} field values, got {}",
            pattern.len(),
            values.len()
        )));
    }

    let fields = pattern
        .fields()
        .iter()
        .zip(values)
        .map(|((name, _), value)| (name.clone(), value))
        .collect();

    Ok(DecodedKey {
        key: KeyString::new(fields),
        record_id,
    })
}

/// Reads comma-separated values one JSON value at a time. A token that is
/// not JSON runs up to the next comma and is kept as a string.
fn split_field_values(text: &str) -> Vec<Bson> {
    let mut values = Vec::new();
    let mut rest = text.trim_start();

    while !rest.is_empty() {
        let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<serde_json::Value>();
        let (value, consumed) = match stream.next() {
            Some(Ok(json)) => {
                let consumed = stream.byte_offset();
                let value = Bson::try_from(json)
                    .unwrap_or_else(|_| Bson::String(rest[..consumed].trim().to_string()));
                (value, consumed)
            }
            _ => {
                let end = rest.find(',').unwrap_or(rest.len());
                (Bson::String(rest[..end].trim().to_string()), end)
            }
        };
        values.push(value);

        rest = rest[consumed..].trim_start();
        rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
    }

    values
}

fn parse_record_id(token: &str) -> Result<i64, KeyStringError> {
    let pattern = Regex::new(r"-?\d+")
        .map_err(|e| KeyStringError::HelperOutput(e.to_string()))?;
    pattern
        .find_iter(token)
        .last()
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| KeyStringError::HelperOutput(format!("no record id in '{}'", token)))
}

fn parse_field_value(token: &str) -> Bson {
    serde_json::from_str::<serde_json::Value>(token)
        .ok()
        .and_then(|json| Bson::try_from(json).ok())
        .unwrap_or_else(|| Bson::String(token.to_string()))
}
