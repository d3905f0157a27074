//! Index key patterns
//!
//! A key pattern is the ordered list of `(field, direction)` pairs an index
//! was declared with, e.g. `{ lastName: 1, age: -1 }`. Field order and
//! direction drive both encoding and decoding of composite keys.

use std::fmt;

use bson::{Bson, Document};

/// Sort direction of one indexed field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    /// Returns the catalog representation (`1` or `-1`)
    pub fn as_i32(self) -> i32 {
        match self {
            Direction::Ascending => 1,
            Direction::Descending => -1,
        }
    }

    fn from_bson(value: &Bson) -> Self {
        let negative = match value {
            Bson::Int32(v) => *v < 0,
            Bson::Int64(v) => *v < 0,
            Bson::Double(v) => *v < 0.0,
            // Special index types ("hashed", "text", "2dsphere") sort ascending
            _ => false,
        };
        if negative {
            Direction::Descending
        } else {
            Direction::Ascending
        }
    }
}

/// Ordered field pattern of an index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPattern {
    fields: Vec<(String, Direction)>,
}

impl KeyPattern {
    pub fn new(fields: Vec<(String, Direction)>) -> Self {
        Self { fields }
    }

    /// Pattern with every listed field ascending
    pub fn ascending(names: &[&str]) -> Self {
        Self::new(
            names
                .iter()
                .map(|name| (name.to_string(), Direction::Ascending))
                .collect(),
        )
    }

    /// The `{ _id: 1 }` pattern
    pub fn id() -> Self {
        Self::ascending(&["_id"])
    }

    /// Builds a pattern from a catalog `key` document, preserving field order
    pub fn from_document(doc: &Document) -> Self {
        Self::new(
            doc.iter()
                .map(|(name, value)| (name.clone(), Direction::from_bson(value)))
                .collect(),
        )
    }

    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        for (name, direction) in &self.fields {
            doc.insert(name.clone(), Bson::Int32(direction.as_i32()));
        }
        doc
    }

    pub fn fields(&self) -> &[(String, Direction)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True only for `{ _id: 1 }`, whose record id lives in the value
    /// rather than the key
    pub fn is_id_pattern(&self) -> bool {
        matches!(self.fields.as_slice(), [(name, Direction::Ascending)] if name == "_id")
    }

    /// JSON form passed to the external key helper, e.g. `{"a": 1, "b": -1}`
    pub fn to_json(&self) -> String {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|(name, direction)| {
                format!(
                    "{}: {}",
                    serde_json::Value::String(name.clone()),
                    direction.as_i32()
                )
            })
            .collect();
        format!("{{{}}}", parts.join(", "))
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ ")?;
        for (i, (name, direction)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", name, direction.as_i32())?;
        }
        write!(f, " }}")
    }
}
