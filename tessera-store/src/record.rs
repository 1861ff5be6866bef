//! Persisted entity records and their versioned property records.
//!
//! Every write appends a new [`PropertyRecord`]; nothing is mutated in
//! place. Readers see the record with the greatest timestamp among all
//! records sharing a name (newest wins). History only shrinks through an
//! explicit remove, which deletes every version of a name at once.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tessera_types::{EntityId, EntityType, HybridTimestamp, PropertyType};

/// Reserved key returning the record's identifier.
pub const RESERVED_IDENTIFIER: &str = "identifier";
/// Reserved key returning the record's entity type.
pub const RESERVED_TYPE: &str = "type";
/// Reserved key returning the record's creation timestamp.
pub const RESERVED_DATESTAMP: &str = "datestamp";

/// True if a key name is one of the reserved synthetic keys.
#[must_use]
pub fn is_reserved(name: &str) -> bool {
    matches!(name, RESERVED_IDENTIFIER | RESERVED_TYPE | RESERVED_DATESTAMP)
}

/// The storage kind of a property record.
///
/// A closed set: each kind maps to one collection on the owning record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    String,
    Integer,
    Double,
    Boolean,
    Date,
    Binary,
    Relationship,
}

impl StorageKind {
    /// All storage kinds, in collection order.
    pub const ALL: [StorageKind; 7] = [
        Self::String,
        Self::Integer,
        Self::Double,
        Self::Boolean,
        Self::Date,
        Self::Binary,
        Self::Relationship,
    ];

    /// Wire name of the kind, used as the kind-tag key in interchange
    /// documents. `Relationship` travels as `entity`, `Binary` as `data`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Binary => "data",
            Self::Relationship => "entity",
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::String => 0,
            Self::Integer => 1,
            Self::Double => 2,
            Self::Boolean => 3,
            Self::Date => 4,
            Self::Binary => 5,
            Self::Relationship => 6,
        }
    }
}

/// The kind-specific payload of a property record.
///
/// Exhaustively matched at the storage boundary; no runtime type
/// inspection. A relationship holds a non-owning target identifier that is
/// nullified when the target record is deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoredValue {
    String(String),
    Integer(i64),
    Double(f64),
    Boolean(bool),
    Date(HybridTimestamp),
    Binary(Vec<u8>),
    Relationship(Option<EntityId>),
}

impl StoredValue {
    /// The storage kind this value belongs to.
    #[must_use]
    pub const fn kind(&self) -> StorageKind {
        match self {
            Self::String(_) => StorageKind::String,
            Self::Integer(_) => StorageKind::Integer,
            Self::Double(_) => StorageKind::Double,
            Self::Boolean(_) => StorageKind::Boolean,
            Self::Date(_) => StorageKind::Date,
            Self::Binary(_) => StorageKind::Binary,
            Self::Relationship(_) => StorageKind::Relationship,
        }
    }
}

/// One immutable version of one property on one entity record.
///
/// Owned exclusively by its [`EntityRecord`]; removed when the owner is
/// deleted. Multiple records may share a name — that is the version
/// history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    /// The attribute key.
    pub name: String,
    /// The declared (semantic) type of the value.
    pub property_type: PropertyType,
    /// When this version was written.
    pub timestamp: HybridTimestamp,
    /// The kind-specific payload.
    pub value: StoredValue,
}

/// A persisted entity: identifier, dynamic type, creation timestamp, and
/// one property-record collection per storage kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    identifier: EntityId,
    entity_type: EntityType,
    created_at: HybridTimestamp,
    /// Last timestamp issued for a live write; keeps versions on this
    /// record strictly ordered even within one millisecond.
    clock: HybridTimestamp,
    collections: [Vec<PropertyRecord>; 7],
}

impl EntityRecord {
    /// Creates a record stamped now.
    #[must_use]
    pub fn new(identifier: EntityId, entity_type: EntityType) -> Self {
        let created_at = HybridTimestamp::now();
        Self {
            identifier,
            entity_type,
            created_at,
            clock: created_at,
            collections: Default::default(),
        }
    }

    /// Creates a record with an explicit creation timestamp (import path).
    #[must_use]
    pub fn with_creation(
        identifier: EntityId,
        entity_type: EntityType,
        created_at: HybridTimestamp,
    ) -> Self {
        Self {
            identifier,
            entity_type,
            created_at,
            clock: created_at,
            collections: Default::default(),
        }
    }

    /// The stable identifier, generated once and immutable.
    #[must_use]
    pub fn identifier(&self) -> EntityId {
        self.identifier
    }

    /// The dynamic entity type, set at creation.
    #[must_use]
    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    /// When this record was created.
    #[must_use]
    pub fn created_at(&self) -> HybridTimestamp {
        self.created_at
    }

    /// Appends a new version stamped with the record's own monotonic
    /// clock; never overwrites. Returns the timestamp issued.
    pub fn append(
        &mut self,
        name: impl Into<String>,
        property_type: PropertyType,
        value: StoredValue,
    ) -> HybridTimestamp {
        let timestamp = self.clock.tick();
        self.clock = timestamp;
        self.push(PropertyRecord {
            name: name.into(),
            property_type,
            timestamp,
            value,
        });
        timestamp
    }

    /// Appends a version with an explicit timestamp (import path). The
    /// record clock only advances, so later live writes still win over
    /// replayed history.
    pub fn append_at(
        &mut self,
        name: impl Into<String>,
        property_type: PropertyType,
        timestamp: HybridTimestamp,
        value: StoredValue,
    ) {
        if timestamp > self.clock {
            self.clock = timestamp;
        }
        self.push(PropertyRecord {
            name: name.into(),
            property_type,
            timestamp,
            value,
        });
    }

    fn push(&mut self, record: PropertyRecord) {
        let idx = record.value.kind().index();
        self.collections[idx].push(record);
    }

    /// The newest version of a named property, scanning every kind
    /// collection that could hold it. `None` if the name was never set.
    #[must_use]
    pub fn newest(&self, name: &str) -> Option<&PropertyRecord> {
        self.collections
            .iter()
            .flatten()
            .filter(|r| r.name == name)
            .max_by_key(|r| r.timestamp)
    }

    /// Every version of a named property, oldest first.
    #[must_use]
    pub fn versions(&self, name: &str) -> Vec<&PropertyRecord> {
        let mut out: Vec<&PropertyRecord> = self
            .collections
            .iter()
            .flatten()
            .filter(|r| r.name == name)
            .collect();
        out.sort_by_key(|r| r.timestamp);
        out
    }

    /// Every property name ever used on this record.
    #[must_use]
    pub fn names_used(&self) -> BTreeSet<String> {
        self.collections
            .iter()
            .flatten()
            .map(|r| r.name.clone())
            .collect()
    }

    /// All property records across every kind, in collection order.
    pub fn history(&self) -> impl Iterator<Item = &PropertyRecord> {
        self.collections.iter().flatten()
    }

    /// Deletes every historical version of each given name, not only the
    /// newest. Returns the number of records removed.
    pub fn remove(&mut self, names: &[&str]) -> usize {
        let mut removed = 0;
        for collection in &mut self.collections {
            let before = collection.len();
            collection.retain(|r| !names.contains(&r.name.as_str()));
            removed += before - collection.len();
        }
        removed
    }

    /// Nullifies every relationship record pointing at the given target.
    /// Returns true if any record changed.
    pub fn nullify_relationships_to(&mut self, target: EntityId) -> bool {
        let mut changed = false;
        for record in &mut self.collections[StorageKind::Relationship.index()] {
            if let StoredValue::Relationship(value) = &mut record.value {
                if *value == Some(target) {
                    *value = None;
                    changed = true;
                }
            }
        }
        changed
    }

    /// Total number of property records across all kinds.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.collections.iter().map(Vec::len).sum()
    }
}
