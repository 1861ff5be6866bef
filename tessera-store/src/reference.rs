//! Deferred entity references: matchers, resolver states, and the
//! caller-facing handle.
//!
//! An [`EntityReference`] describes *which* entity the caller means without
//! touching storage. The engine resolves it lazily: identifier lookup,
//! predicate matching, or auto-creation when an initializer is present.
//! The resolver is an explicit state machine held in a shared mutable
//! cell, so a reference that resolved once stays bound.

use crate::backend::AffinityId;
use crate::value::PropertyDictionary;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tessera_types::{EntityId, EntityType};

/// A property key: a name tag, optionally embedding an entity reference.
///
/// A composite key's resolved name depends on first resolving the embedded
/// reference: `PropertyKey::composite("section", r)` resolves to
/// `"section-<identifier>"`.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyKey {
    prefix: String,
    reference: Option<EntityReference>,
}

impl PropertyKey {
    /// A simple key: the name is the prefix itself.
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            prefix: name.into(),
            reference: None,
        }
    }

    /// A composite key whose full name is `"<prefix>-<identifier>"` once
    /// the embedded reference resolves.
    #[must_use]
    pub fn composite(prefix: impl Into<String>, reference: EntityReference) -> Self {
        Self {
            prefix: prefix.into(),
            reference: Some(reference),
        }
    }

    /// The name prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The embedded reference, if this is a composite key.
    #[must_use]
    pub fn reference(&self) -> Option<&EntityReference> {
        self.reference.as_ref()
    }

    /// The full key name given a resolved identifier for the embedded
    /// reference. Simple keys ignore the argument.
    #[must_use]
    pub fn resolved_name(&self, id: Option<EntityId>) -> String {
        match (&self.reference, id) {
            (Some(_), Some(id)) => format!("{}-{}", self.prefix, id),
            _ => self.prefix.clone(),
        }
    }
}

impl Eq for PropertyKey {}

impl Hash for PropertyKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.prefix.hash(state);
        if let Some(r) = &self.reference {
            r.cell_id().hash(state);
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self::name(s)
    }
}

/// A predicate locating an existing record.
///
/// Matchers are tried strictly in the order supplied; the first that finds
/// a match wins. Order an identifier matcher before a value matcher:
/// identifier lookup is indexed, value matching is a full scan.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityMatcher {
    /// Indexed equality on the identifier attribute.
    ByIdentifier(EntityId),
    /// Linear scan over all entities of any type, comparing the newest
    /// value of the named attribute against a target string. Deliberately
    /// unindexed; the tie-break among equal values is iteration order.
    ByValue { key: String, value: String },
}

impl EntityMatcher {
    /// Shorthand for matching on the `name` attribute.
    #[must_use]
    pub fn by_name(value: impl Into<String>) -> Self {
        Self::ByValue {
            key: "name".to_string(),
            value: value.into(),
        }
    }
}

/// Describes the record to create when no matcher succeeds.
///
/// Relationship values inside `properties` may themselves trigger
/// recursive auto-creation.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityInitializer {
    pub entity_type: EntityType,
    pub properties: PropertyDictionary,
}

impl EntityInitializer {
    #[must_use]
    pub fn new(entity_type: impl Into<EntityType>) -> Self {
        Self {
            entity_type: entity_type.into(),
            properties: PropertyDictionary::new(),
        }
    }

    #[must_use]
    pub fn with_properties(mut self, properties: PropertyDictionary) -> Self {
        self.properties = properties;
        self
    }
}

/// The resolver state machine.
///
/// `Unresolved → Cached` on first resolution; a `Cached` state re-maps to
/// a new affinity by identifier when resolved against a different storage
/// session; `Null` is terminal and always yields no result (also the
/// landing state when a cached target turns out deleted).
#[derive(Debug, Clone)]
pub enum ResolverState {
    Unresolved {
        matchers: Vec<EntityMatcher>,
        initializer: Option<EntityInitializer>,
    },
    Cached {
        affinity: AffinityId,
        id: EntityId,
    },
    Null,
}

/// A caller-facing handle: resolver + optional pending updates + optional
/// previously fetched snapshot.
///
/// Cloning shares the resolver cell, so all clones observe the same
/// binding. Equality and hashing are defined by resolver identity, not by
/// the dictionaries.
#[derive(Debug, Clone)]
pub struct EntityReference {
    resolver: Arc<Mutex<ResolverState>>,
    pending: Option<PropertyDictionary>,
    snapshot: Option<PropertyDictionary>,
}

impl EntityReference {
    fn from_state(state: ResolverState) -> Self {
        Self {
            resolver: Arc::new(Mutex::new(state)),
            pending: None,
            snapshot: None,
        }
    }

    /// A reference located by identifier.
    #[must_use]
    pub fn by_identifier(id: EntityId) -> Self {
        Self::from_state(ResolverState::Unresolved {
            matchers: vec![EntityMatcher::ByIdentifier(id)],
            initializer: None,
        })
    }

    /// A reference located by the newest value of the `name` attribute.
    #[must_use]
    pub fn by_name(name: impl Into<String>) -> Self {
        Self::from_state(ResolverState::Unresolved {
            matchers: vec![EntityMatcher::by_name(name)],
            initializer: None,
        })
    }

    /// A reference located by the given matchers, tried in order.
    #[must_use]
    pub fn matching(matchers: Vec<EntityMatcher>) -> Self {
        Self::from_state(ResolverState::Unresolved {
            matchers,
            initializer: None,
        })
    }

    /// A reference that always creates: no matchers, only an initializer.
    #[must_use]
    pub fn create_new(entity_type: impl Into<EntityType>, properties: PropertyDictionary) -> Self {
        Self::from_state(ResolverState::Unresolved {
            matchers: Vec::new(),
            initializer: Some(EntityInitializer::new(entity_type).with_properties(properties)),
        })
    }

    /// A reference already bound to a live record.
    #[must_use]
    pub fn cached(affinity: AffinityId, id: EntityId) -> Self {
        Self::from_state(ResolverState::Cached { affinity, id })
    }

    /// A reference that always resolves to nothing.
    #[must_use]
    pub fn null() -> Self {
        Self::from_state(ResolverState::Null)
    }

    /// Attaches an initializer, turning a lookup into find-or-create.
    ///
    /// No effect on references that already resolved.
    #[must_use]
    pub fn or_create(self, initializer: EntityInitializer) -> Self {
        {
            let mut state = self.lock();
            if let ResolverState::Unresolved {
                initializer: slot, ..
            } = &mut *state
            {
                *slot = Some(initializer);
            }
        }
        self
    }

    /// Shorthand: find by name, creating a record of the given type when
    /// absent (the name matcher seeds the new record's `name` property).
    #[must_use]
    pub fn by_name_or_create(
        name: impl Into<String>,
        entity_type: impl Into<EntityType>,
    ) -> Self {
        Self::by_name(name).or_create(EntityInitializer::new(entity_type))
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ResolverState> {
        self.resolver.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A snapshot of the current resolver state.
    #[must_use]
    pub fn state(&self) -> ResolverState {
        self.lock().clone()
    }

    /// The bound identifier, if this reference has resolved.
    #[must_use]
    pub fn resolved_id(&self) -> Option<EntityId> {
        match &*self.lock() {
            ResolverState::Cached { id, .. } => Some(*id),
            _ => None,
        }
    }

    /// True if the resolver is the terminal null state.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(&*self.lock(), ResolverState::Null)
    }

    /// The pending-updates dictionary, if any.
    #[must_use]
    pub fn pending(&self) -> Option<&PropertyDictionary> {
        self.pending.as_ref()
    }

    /// Attaches pending updates to apply on the next commit.
    #[must_use]
    pub fn with_pending(mut self, pending: PropertyDictionary) -> Self {
        self.pending = Some(pending);
        self
    }

    /// Takes the pending-updates dictionary, leaving none.
    pub fn take_pending(&mut self) -> Option<PropertyDictionary> {
        self.pending.take()
    }

    /// The previously fetched snapshot, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<&PropertyDictionary> {
        self.snapshot.as_ref()
    }

    /// Stores a fetched snapshot on the handle.
    pub fn set_snapshot(&mut self, snapshot: PropertyDictionary) {
        self.snapshot = Some(snapshot);
    }

    /// Stable identity of the resolver cell (used for equality/hashing).
    pub(crate) fn cell_id(&self) -> usize {
        Arc::as_ptr(&self.resolver) as usize
    }
}

impl PartialEq for EntityReference {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.resolver, &other.resolver)
    }
}

impl Eq for EntityReference {}

impl Hash for EntityReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.cell_id().hash(state);
    }
}
