//! Caller-facing property values and dictionaries.
//!
//! [`PropertyValue`] is the ephemeral triple that moves data across the API
//! without exposing storage-kind detail; [`PropertyDictionary`] is the
//! insertion-ordered map used both as a read result and as a pending
//! write-set.

use crate::reference::{EntityReference, PropertyKey};
use tessera_types::{HybridTimestamp, PropertyType};

/// The caller-facing value sum type.
///
/// Mirrors the storage kinds, except relationships appear as deferred
/// [`EntityReference`]s rather than raw identifiers.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Double(f64),
    Boolean(bool),
    Date(HybridTimestamp),
    Binary(Vec<u8>),
    Reference(EntityReference),
}

impl Value {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(d) => Some(*d),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_date(&self) -> Option<HybridTimestamp> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_reference(&self) -> Option<&EntityReference> {
        match self {
            Self::Reference(r) => Some(r),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Self::Double(d)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<EntityReference> for Value {
    fn from(r: EntityReference) -> Self {
        Self::Reference(r)
    }
}

/// A typed, timestamped value crossing the API boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyValue {
    pub value: Value,
    pub property_type: PropertyType,
    pub timestamp: HybridTimestamp,
}

impl PropertyValue {
    /// Creates a value stamped now.
    #[must_use]
    pub fn new(value: impl Into<Value>, property_type: impl Into<PropertyType>) -> Self {
        Self {
            value: value.into(),
            property_type: property_type.into(),
            timestamp: HybridTimestamp::now(),
        }
    }

    /// Creates a value with an explicit timestamp.
    #[must_use]
    pub fn with_timestamp(
        value: impl Into<Value>,
        property_type: impl Into<PropertyType>,
        timestamp: HybridTimestamp,
    ) -> Self {
        Self {
            value: value.into(),
            property_type: property_type.into(),
            timestamp,
        }
    }

    /// Shorthand for a value carrying the default property type.
    #[must_use]
    pub fn untyped(value: impl Into<Value>) -> Self {
        Self::new(value, PropertyType::default())
    }
}

/// An insertion-ordered `PropertyKey → PropertyValue` map.
///
/// Re-inserting an existing key replaces the value in place, keeping the
/// original position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyDictionary {
    entries: Vec<(PropertyKey, PropertyValue)>,
}

impl PropertyDictionary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a value for the key.
    pub fn insert(&mut self, key: PropertyKey, value: PropertyValue) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: PropertyKey, value: PropertyValue) -> Self {
        self.insert(key, value);
        self
    }

    /// Looks up a value by simple key name. Composite keys are only
    /// addressable by their resolved name after application.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.entries
            .iter()
            .find(|(k, _)| k.reference().is_none() && k.prefix() == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PropertyKey, &PropertyValue)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Key names in insertion order (composite keys show their prefix).
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(k, _)| k.prefix()).collect()
    }
}

impl FromIterator<(PropertyKey, PropertyValue)> for PropertyDictionary {
    fn from_iter<I: IntoIterator<Item = (PropertyKey, PropertyValue)>>(iter: I) -> Self {
        let mut dict = Self::new();
        for (k, v) in iter {
            dict.insert(k, v);
        }
        dict
    }
}

impl<'a> FromIterator<(&'a str, PropertyValue)> for PropertyDictionary {
    fn from_iter<I: IntoIterator<Item = (&'a str, PropertyValue)>>(iter: I) -> Self {
        iter.into_iter()
            .map(|(k, v)| (PropertyKey::name(k), v))
            .collect()
    }
}
