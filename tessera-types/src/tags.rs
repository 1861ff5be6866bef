//! Semantic string tags for entity and property types.
//!
//! Both tags are opaque: the engine never interprets their contents, and
//! equality is plain string equality. They exist as newtypes so the two
//! tag spaces cannot be mixed up at call sites.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The dynamic type of an entity record (e.g., `"person"`, `"invoice"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(String);

impl EntityType {
    /// Creates an entity type tag.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The declared type of a property value (e.g., `"address"`, `"score"`).
///
/// Distinct from the storage kind: a `"address"` property is stored as a
/// string, but the declared type survives the round trip through the
/// interchange document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyType(String);

impl PropertyType {
    /// The default type assigned to values decoded from the compact wire
    /// shape, which carries no declared type.
    pub const DEFAULT: &'static str = "string";

    /// Creates a property type tag.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PropertyType {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl From<&str> for PropertyType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PropertyType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
