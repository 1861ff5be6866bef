//! The storage backend contract and the in-memory reference backend.
//!
//! Durable persistence is an external collaborator: the engine only ever
//! talks to this trait. [`MemoryBackend`] is the reference implementation
//! used by tests and as the target of interchange decode passes.

use crate::record::EntityRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tessera_types::{EntityId, EntityType, HybridTimestamp};
use uuid::Uuid;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backend failed to open or has gone away.
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    /// A durable flush failed. Surfaced synchronously to the caller;
    /// there is no automatic retry.
    #[error("save failed: {0}")]
    SaveFailure(String),
}

/// Identifies one storage affinity: one backend instance bound to one
/// storage session. Records resolved under one affinity must not be shared
/// with another; cross-affinity access re-resolves by identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AffinityId(Uuid);

impl AffinityId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AffinityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AffinityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The persistence contract consumed by the core.
///
/// Identifier lookups are indexed; anything else the engine does by
/// scanning [`StorageBackend::fetch_all_identifiers`] in backend iteration
/// order (stable: insertion order for the in-memory backend).
pub trait StorageBackend: Send {
    /// The affinity of this backend instance.
    fn affinity(&self) -> AffinityId;

    /// Creates a record with a freshly generated identifier.
    fn create(&mut self, entity_type: &EntityType) -> EntityId;

    /// Creates a record with the given identifier, or returns the
    /// existing identifier unchanged if one is already present.
    /// `created_at` overrides the creation timestamp (import path).
    fn create_with_identifier(
        &mut self,
        entity_type: &EntityType,
        id: EntityId,
        created_at: Option<HybridTimestamp>,
    ) -> EntityId;

    /// Indexed lookup by identifier.
    fn fetch_by_identifier(&self, id: EntityId) -> Option<&EntityRecord>;

    /// Mutable indexed lookup by identifier.
    fn fetch_by_identifier_mut(&mut self, id: EntityId) -> Option<&mut EntityRecord>;

    /// All identifiers, in backend iteration order.
    fn fetch_all_identifiers(&self) -> Vec<EntityId>;

    /// Deletes a record and its owned property records. Returns false if
    /// the identifier is unknown. The caller is responsible for nullifying
    /// inbound relationships.
    fn delete(&mut self, id: EntityId) -> bool;

    /// Flushes to durable storage.
    fn save(&mut self) -> StorageResult<()>;

    /// Number of records in the store.
    fn count(&self) -> usize;
}

/// In-memory reference backend with stable insertion-order iteration.
#[derive(Debug)]
pub struct MemoryBackend {
    affinity: AffinityId,
    order: Vec<EntityId>,
    records: HashMap<EntityId, EntityRecord>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            affinity: AffinityId::new(),
            order: Vec::new(),
            records: HashMap::new(),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryBackend {
    fn affinity(&self) -> AffinityId {
        self.affinity
    }

    fn create(&mut self, entity_type: &EntityType) -> EntityId {
        let id = EntityId::new();
        self.order.push(id);
        self.records
            .insert(id, EntityRecord::new(id, entity_type.clone()));
        id
    }

    fn create_with_identifier(
        &mut self,
        entity_type: &EntityType,
        id: EntityId,
        created_at: Option<HybridTimestamp>,
    ) -> EntityId {
        if !self.records.contains_key(&id) {
            let record = match created_at {
                Some(ts) => EntityRecord::with_creation(id, entity_type.clone(), ts),
                None => EntityRecord::new(id, entity_type.clone()),
            };
            self.order.push(id);
            self.records.insert(id, record);
        }
        id
    }

    fn fetch_by_identifier(&self, id: EntityId) -> Option<&EntityRecord> {
        self.records.get(&id)
    }

    fn fetch_by_identifier_mut(&mut self, id: EntityId) -> Option<&mut EntityRecord> {
        self.records.get_mut(&id)
    }

    fn fetch_all_identifiers(&self) -> Vec<EntityId> {
        self.order.clone()
    }

    fn delete(&mut self, id: EntityId) -> bool {
        if self.records.remove(&id).is_some() {
            self.order.retain(|o| *o != id);
            true
        } else {
            false
        }
    }

    fn save(&mut self) -> StorageResult<()> {
        // Nothing durable behind the reference backend.
        Ok(())
    }

    fn count(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_assigns_unique_identifiers() {
        let mut b = MemoryBackend::new();
        let t = EntityType::from("person");
        let a = b.create(&t);
        let c = b.create(&t);
        assert_ne!(a, c);
        assert_eq!(b.count(), 2);
    }

    #[test]
    fn create_with_identifier_is_idempotent() {
        let mut b = MemoryBackend::new();
        let t = EntityType::from("person");
        let id = EntityId::new();
        b.create_with_identifier(&t, id, None);
        b.create_with_identifier(&EntityType::from("other"), id, None);
        assert_eq!(b.count(), 1);
        assert_eq!(b.fetch_by_identifier(id).unwrap().entity_type(), &t);
    }

    #[test]
    fn iteration_order_is_insertion_order() {
        let mut b = MemoryBackend::new();
        let t = EntityType::from("x");
        let ids: Vec<_> = (0..5).map(|_| b.create(&t)).collect();
        assert_eq!(b.fetch_all_identifiers(), ids);
    }

    #[test]
    fn delete_removes_record_and_order_entry() {
        let mut b = MemoryBackend::new();
        let t = EntityType::from("x");
        let id = b.create(&t);
        assert!(b.delete(id));
        assert!(!b.delete(id));
        assert_eq!(b.count(), 0);
        assert!(b.fetch_all_identifiers().is_empty());
    }

    #[test]
    fn affinities_differ_per_instance() {
        assert_ne!(MemoryBackend::new().affinity(), MemoryBackend::new().affinity());
    }
}
