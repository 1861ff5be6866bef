//! The reference-resolution engine.
//!
//! Turns an abstract "which entity" description into a concrete record,
//! lazily and memoized, reporting every record it had to create as a side
//! effect. Creation can cascade: a relationship value inside an
//! initializer is itself a reference, which may auto-create its own
//! target, and so on transitively.

use crate::backend::StorageBackend;
use crate::record::{is_reserved, StoredValue};
use crate::reference::{EntityInitializer, EntityMatcher, EntityReference, ResolverState};
use crate::value::{PropertyDictionary, Value};
use tessera_types::{EntityId, PropertyType};
use tracing::{debug, warn};

/// The outcome of resolving a reference: the bound record plus the full
/// transitive list of records created along the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub id: EntityId,
    pub created: Vec<EntityId>,
}

impl Resolution {
    fn found(id: EntityId) -> Self {
        Self {
            id,
            created: Vec::new(),
        }
    }
}

/// Resolves a reference against the backend. `None` means "no result",
/// which is a normal outcome, not an error.
///
/// Idempotent within one storage affinity: once cached, later calls return
/// the same record without re-searching. Against a different affinity the
/// cached identifier re-maps via an indexed fetch; a vanished target moves
/// the resolver to its terminal null state.
pub(crate) fn resolve(
    backend: &mut dyn StorageBackend,
    reference: &EntityReference,
) -> Option<Resolution> {
    // Snapshot the state rather than holding the lock across storage
    // calls; recursive resolution would otherwise deadlock on the cell.
    let state = reference.state();
    match state {
        ResolverState::Null => None,

        ResolverState::Cached { affinity, id } => {
            let exists = backend.fetch_by_identifier(id).is_some();
            if !exists {
                debug!(%id, "cached reference target no longer exists");
                *reference.lock() = ResolverState::Null;
                return None;
            }
            if affinity != backend.affinity() {
                debug!(%id, "remapping reference to a new storage affinity");
                *reference.lock() = ResolverState::Cached {
                    affinity: backend.affinity(),
                    id,
                };
            }
            Some(Resolution::found(id))
        }

        ResolverState::Unresolved {
            matchers,
            initializer,
        } => {
            // Strictly in supplied order; the first match wins.
            for matcher in &matchers {
                if let Some(id) = match_entity(&*backend, matcher) {
                    *reference.lock() = ResolverState::Cached {
                        affinity: backend.affinity(),
                        id,
                    };
                    return Some(Resolution::found(id));
                }
            }

            let initializer = initializer?;
            let id = vivify(backend, &matchers, &initializer);
            // Bind the cell before applying the initializer's dictionary:
            // a dictionary value may hold a clone of this same reference,
            // and it must resolve to the record just created rather than
            // re-entering the unresolved path.
            *reference.lock() = ResolverState::Cached {
                affinity: backend.affinity(),
                id,
            };
            let mut created = vec![id];
            let outcome = apply_dictionary(backend, id, &initializer.properties);
            created.extend(outcome.created);
            warn!(
                target: "tessera::autoviv",
                %id,
                entity_type = %initializer.entity_type,
                created = created.len(),
                "created records as a side effect of reference resolution"
            );
            Some(Resolution { id, created })
        }
    }
}

/// Evaluates a single matcher. Identifier matching is an indexed fetch;
/// value matching is a full linear scan with no index, by design.
fn match_entity(backend: &dyn StorageBackend, matcher: &EntityMatcher) -> Option<EntityId> {
    match matcher {
        EntityMatcher::ByIdentifier(id) => {
            backend.fetch_by_identifier(*id).map(|r| r.identifier())
        }
        EntityMatcher::ByValue { key, value } => {
            for id in backend.fetch_all_identifiers() {
                let Some(record) = backend.fetch_by_identifier(id) else {
                    continue;
                };
                if let Some(StoredValue::String(s)) = record.newest(key).map(|p| &p.value) {
                    if s == value {
                        return Some(id);
                    }
                }
            }
            None
        }
    }
}

/// Auto-vivification: creates a record of the initializer's declared type
/// and lets each matcher seed its corresponding field. The initializer's
/// property set is applied by the caller, after the resolver cell is bound.
fn vivify(
    backend: &mut dyn StorageBackend,
    matchers: &[EntityMatcher],
    initializer: &EntityInitializer,
) -> EntityId {
    // An identifier matcher seeds the identifier itself.
    let requested = matchers.iter().find_map(|m| match m {
        EntityMatcher::ByIdentifier(id) => Some(*id),
        EntityMatcher::ByValue { .. } => None,
    });
    let id = match requested {
        Some(requested) => backend.create_with_identifier(&initializer.entity_type, requested, None),
        None => backend.create(&initializer.entity_type),
    };

    // A value matcher seeds the property it would have matched on.
    for matcher in matchers {
        if let EntityMatcher::ByValue { key, value } = matcher {
            if let Some(record) = backend.fetch_by_identifier_mut(id) {
                record.append(
                    key.clone(),
                    PropertyType::default(),
                    StoredValue::String(value.clone()),
                );
            }
        }
    }
    id
}

/// The net effect of applying a dictionary to a record.
#[derive(Debug, Default)]
pub(crate) struct DictOutcome {
    /// Records created as a side effect of key or value resolution.
    pub created: Vec<EntityId>,
    /// Resolved key names actually written.
    pub keys: Vec<String>,
}

/// Applies every (key, value) pair of a dictionary to the target record:
/// composite keys resolve their embedded reference first, relationship
/// values resolve (and possibly create) their targets, and each pair lands
/// as an append-only property add.
pub(crate) fn apply_dictionary(
    backend: &mut dyn StorageBackend,
    target: EntityId,
    dict: &PropertyDictionary,
) -> DictOutcome {
    let mut out = DictOutcome::default();

    for (key, value) in dict.iter() {
        let name = match key.reference() {
            Some(reference) => match resolve(backend, reference) {
                Some(res) => {
                    out.created.extend(res.created.iter().copied());
                    key.resolved_name(Some(res.id))
                }
                None => {
                    warn!(
                        prefix = key.prefix(),
                        "skipping composite key with unresolvable reference"
                    );
                    continue;
                }
            },
            None => key.prefix().to_string(),
        };

        if is_reserved(&name) {
            warn!(key = %name, "reserved keys are derived, never stored; skipping");
            continue;
        }

        let stored = match &value.value {
            Value::String(s) => StoredValue::String(s.clone()),
            Value::Integer(i) => StoredValue::Integer(*i),
            Value::Double(d) => StoredValue::Double(*d),
            Value::Boolean(b) => StoredValue::Boolean(*b),
            Value::Date(d) => StoredValue::Date(*d),
            Value::Binary(b) => StoredValue::Binary(b.clone()),
            Value::Reference(reference) => match resolve(backend, reference) {
                Some(res) => {
                    out.created.extend(res.created.iter().copied());
                    StoredValue::Relationship(Some(res.id))
                }
                None => StoredValue::Relationship(None),
            },
        };

        if let Some(record) = backend.fetch_by_identifier_mut(target) {
            record.append(name.clone(), value.property_type.clone(), stored);
            out.keys.push(name);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::value::PropertyValue;
    use tessera_types::EntityType;

    fn seeded_backend() -> (MemoryBackend, EntityId) {
        let mut b = MemoryBackend::new();
        let id = b.create(&EntityType::from("person"));
        b.fetch_by_identifier_mut(id).unwrap().append(
            "name",
            PropertyType::default(),
            StoredValue::String("Ada".into()),
        );
        (b, id)
    }

    #[test]
    fn identifier_match_resolves_and_caches() {
        let (mut b, id) = seeded_backend();
        let reference = EntityReference::by_identifier(id);
        let res = resolve(&mut b, &reference).unwrap();
        assert_eq!(res.id, id);
        assert!(res.created.is_empty());
        assert_eq!(reference.resolved_id(), Some(id));
    }

    #[test]
    fn value_match_scans_all_entities() {
        let (mut b, id) = seeded_backend();
        let reference = EntityReference::by_name("Ada");
        let res = resolve(&mut b, &reference).unwrap();
        assert_eq!(res.id, id);
    }

    #[test]
    fn no_match_without_initializer_yields_none() {
        let (mut b, _) = seeded_backend();
        assert!(resolve(&mut b, &EntityReference::by_name("Unknown")).is_none());
        assert!(resolve(&mut b, &EntityReference::by_identifier(EntityId::new())).is_none());
    }

    #[test]
    fn matcher_order_first_match_wins() {
        let (mut b, ada) = seeded_backend();
        let other = b.create(&EntityType::from("person"));
        // Identifier matcher listed first wins even though the value
        // matcher would find Ada.
        let reference = EntityReference::matching(vec![
            EntityMatcher::ByIdentifier(other),
            EntityMatcher::by_name("Ada"),
        ]);
        let res = resolve(&mut b, &reference).unwrap();
        assert_eq!(res.id, other);
        assert_ne!(res.id, ada);
    }

    #[test]
    fn vivify_seeds_identifier_and_value_fields() {
        let mut b = MemoryBackend::new();
        let requested = EntityId::new();
        let reference = EntityReference::matching(vec![
            EntityMatcher::ByIdentifier(requested),
            EntityMatcher::by_name("Unknown"),
        ])
        .or_create(EntityInitializer::new("person"));

        let res = resolve(&mut b, &reference).unwrap();
        assert_eq!(res.id, requested);
        assert_eq!(res.created, vec![requested]);
        let record = b.fetch_by_identifier(requested).unwrap();
        assert_eq!(
            record.newest("name").unwrap().value,
            StoredValue::String("Unknown".into())
        );
        assert_eq!(record.entity_type(), &EntityType::from("person"));
    }

    #[test]
    fn vivify_recurses_through_relationship_values() {
        let mut b = MemoryBackend::new();
        let owner_ref = EntityReference::by_name("Bob").or_create(EntityInitializer::new("person"));
        let props: PropertyDictionary = [(
            "owner",
            PropertyValue::new(owner_ref, "relationship"),
        )]
        .into_iter()
        .collect();
        let reference = EntityReference::create_new("document", props);

        let res = resolve(&mut b, &reference).unwrap();
        assert_eq!(res.created.len(), 2);
        assert_eq!(res.created[0], res.id);
        let bob = res.created[1];
        let doc = b.fetch_by_identifier(res.id).unwrap();
        assert_eq!(
            doc.newest("owner").unwrap().value,
            StoredValue::Relationship(Some(bob))
        );
        assert_eq!(
            b.fetch_by_identifier(bob).unwrap().newest("name").unwrap().value,
            StoredValue::String("Bob".into())
        );
    }

    #[test]
    fn self_referential_initializer_terminates() {
        // A matcherless reference whose initializer dictionary holds a
        // clone of the reference itself: the clone must resolve to the
        // record being created instead of re-entering the unresolved path.
        let mut b = MemoryBackend::new();
        let reference = EntityReference::matching(Vec::new());
        let clone = reference.clone();
        let props: PropertyDictionary = [("self", PropertyValue::new(clone, "relationship"))]
            .into_iter()
            .collect();
        let reference =
            reference.or_create(EntityInitializer::new("node").with_properties(props));

        let res = resolve(&mut b, &reference).unwrap();
        assert_eq!(res.created, vec![res.id]);
        let record = b.fetch_by_identifier(res.id).unwrap();
        assert_eq!(
            record.newest("self").unwrap().value,
            StoredValue::Relationship(Some(res.id))
        );
    }

    #[test]
    fn cached_reference_survives_affinity_change() {
        let (mut b, id) = seeded_backend();
        let reference = EntityReference::by_identifier(id);
        resolve(&mut b, &reference).unwrap();

        // Simulate reopening the same logical store in a new session: the
        // records move to a backend with a different affinity.
        let mut second = MemoryBackend::new();
        let record = b.fetch_by_identifier(id).unwrap().clone();
        second.create_with_identifier(record.entity_type(), id, Some(record.created_at()));
        let res = resolve(&mut second, &reference).unwrap();
        assert_eq!(res.id, id);
        match reference.state() {
            ResolverState::Cached { affinity, .. } => assert_eq!(affinity, second.affinity()),
            _ => panic!("expected cached"),
        }
    }

    #[test]
    fn cached_reference_to_deleted_target_goes_null() {
        let (mut b, id) = seeded_backend();
        let reference = EntityReference::by_identifier(id);
        resolve(&mut b, &reference).unwrap();
        b.delete(id);
        assert!(resolve(&mut b, &reference).is_none());
        assert!(reference.is_null());
        // Terminal: stays null even if the record reappears.
        b.create_with_identifier(&EntityType::from("person"), id, None);
        assert!(resolve(&mut b, &reference).is_none());
    }

    #[test]
    fn reserved_keys_are_never_stored_via_dictionary() {
        let (mut b, id) = seeded_backend();
        let dict: PropertyDictionary = [
            ("identifier", PropertyValue::untyped("forged")),
            ("note", PropertyValue::untyped("kept")),
        ]
        .into_iter()
        .collect();
        let out = apply_dictionary(&mut b, id, &dict);
        assert_eq!(out.keys, vec!["note".to_string()]);
        assert!(b.fetch_by_identifier(id).unwrap().newest("identifier").is_none());
    }
}
