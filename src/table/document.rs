//! BSON document codec helpers

use bson::Document;

use crate::errors::{InspectError, InspectResult};

/// Decodes a value that must be exactly one BSON document
pub fn decode_document(bytes: &[u8]) -> InspectResult<Document> {
    let mut reader = bytes;
    let document = Document::from_reader(&mut reader)?;
    if !reader.is_empty() {
        return Err(InspectError::decode("trailing bytes after BSON document")
            .with_details(format!("{} of {} bytes unread", reader.len(), bytes.len())));
    }
    Ok(document)
}

pub fn encode_document(document: &Document) -> InspectResult<Vec<u8>> {
    let mut bytes = Vec::new();
    document.to_writer(&mut bytes)?;
    Ok(bytes)
}
