//! Decoded index keys

use std::fmt;

use bson::{Bson, Document};

/// Ordered field values of one decoded index key
#[derive(Debug, Clone, PartialEq)]
pub struct KeyString {
    fields: Vec<(String, Bson)>,
}

impl KeyString {
    pub fn new(fields: Vec<(String, Bson)>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[(String, Bson)] {
        &self.fields
    }

    pub fn values(&self) -> impl Iterator<Item = &Bson> {
        self.fields.iter().map(|(_, value)| value)
    }

    pub fn get(&self, field: &str) -> Option<&Bson> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        for (name, value) in &self.fields {
            doc.insert(name.clone(), value.clone());
        }
        doc
    }
}

impl fmt::Display for KeyString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ ")?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", name, value)?;
        }
        write!(f, " }}")
    }
}
