//! The top-level interchange document.

use crate::{InterchangeError, InterchangeResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A flat interchange document: one entry per entity record.
///
/// Entries are raw JSON maps; everything past the reserved fields is an
/// attribute in either the compact or the normalized shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub entities: Vec<Map<String, Value>>,
}

impl Document {
    /// Parses a document from JSON text. Any parse failure — or a shape
    /// other than `{"entities": [...]}` — is a malformed document.
    pub fn from_json(json: &str) -> InterchangeResult<Self> {
        serde_json::from_str(json).map_err(|e| InterchangeError::MalformedDocument(e.to_string()))
    }

    /// Serializes the document to JSON text.
    pub fn to_json(&self) -> InterchangeResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Number of entity entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
