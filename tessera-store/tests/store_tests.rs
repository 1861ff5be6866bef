use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};
use tessera_store::{
    AffinityId, EntityRecord, EntityReference, MemoryBackend, PropertyDictionary, PropertyKey,
    PropertyValue, StorageBackend, StorageError, StorageResult, Store, StoreConfig, Value,
};
use tessera_types::{ChangeAction, ChangeNotification, EntityId, EntityType, HybridTimestamp};

fn store() -> Store {
    Store::new(StoreConfig::default())
}

fn watch(store: &mut Store) -> Arc<Mutex<Vec<ChangeNotification>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    store.subscribe(move |n| sink.lock().unwrap().push(n.clone()));
    seen
}

// ── Newest-wins reads ────────────────────────────────────────────

#[test]
fn second_add_wins() {
    let mut store = store();
    let id = store.create("person");
    let target = store.reference_to(id);
    store.add_value(&target, "name", PropertyValue::untyped("Ada")).unwrap();
    store.add_value(&target, "name", PropertyValue::untyped("Grace")).unwrap();

    let result = store.read(id, &["name"]);
    assert_eq!(result.get("name").unwrap().value.as_str(), Some("Grace"));
}

#[test]
fn read_all_reports_each_key_once() {
    let mut store = store();
    let id = store.create("person");
    let target = store.reference_to(id);
    store.add_value(&target, "name", PropertyValue::untyped("Ada")).unwrap();
    store.add_value(&target, "name", PropertyValue::untyped("Grace")).unwrap();
    store.add_value(&target, "age", PropertyValue::untyped(36i64)).unwrap();

    let all = store.read_all(id);
    assert_eq!(all.len(), 2);
    assert_eq!(all.get("name").unwrap().value.as_str(), Some("Grace"));
    assert_eq!(all.get("age").unwrap().value.as_integer(), Some(36));
}

#[test]
fn absent_names_are_missing_not_defaulted() {
    let mut store = store();
    let id = store.create("person");
    let result = store.read(id, &["never-set"]);
    assert!(result.is_empty());
}

#[test]
fn read_on_unknown_entity_is_empty() {
    let mut store = store();
    assert!(store.read(EntityId::new(), &["name"]).is_empty());
    assert!(store.read_all(EntityId::new()).is_empty());
}

// ── Remove ───────────────────────────────────────────────────────

#[test]
fn remove_erases_every_version() {
    let mut store = store();
    let id = store.create("person");
    let target = store.reference_to(id);
    store.add_value(&target, "name", PropertyValue::untyped("Ada")).unwrap();
    store.add_value(&target, "name", PropertyValue::untyped("Grace")).unwrap();

    assert_eq!(store.remove(id, &["name"]), 2);
    assert!(store.read(id, &["name"]).is_empty());
    assert!(store.read_all(id).is_empty());
}

#[test]
fn remove_missing_name_is_noop() {
    let mut store = store();
    let id = store.create("person");
    assert_eq!(store.remove(id, &["nope"]), 0);
}

// ── Reserved synthetic keys ──────────────────────────────────────

#[test]
fn reserved_keys_only_when_requested() {
    let mut store = store();
    let id = store.create("person");
    let target = store.reference_to(id);
    store.add_value(&target, "name", PropertyValue::untyped("Ada")).unwrap();

    let all = store.read_all(id);
    assert!(all.get("identifier").is_none());
    assert!(all.get("type").is_none());
    assert!(all.get("datestamp").is_none());

    let result = store.read(id, &["identifier", "type", "datestamp", "name"]);
    assert_eq!(
        result.get("identifier").unwrap().value.as_str(),
        Some(id.to_string().as_str())
    );
    assert_eq!(result.get("type").unwrap().value.as_str(), Some("person"));
    assert!(result.get("datestamp").unwrap().value.as_date().is_some());
    assert_eq!(result.get("name").unwrap().value.as_str(), Some("Ada"));
}

#[test]
fn reserved_keys_cannot_be_stored() {
    let mut store = store();
    let id = store.create("person");
    let target = store.reference_to(id);
    let dict: PropertyDictionary = [
        ("type", PropertyValue::untyped("forged")),
        ("name", PropertyValue::untyped("Ada")),
    ]
    .into_iter()
    .collect();
    store.add(&target, &dict).unwrap();

    let result = store.read(id, &["type", "name"]);
    assert_eq!(result.get("type").unwrap().value.as_str(), Some("person"));
    assert_eq!(result.get("name").unwrap().value.as_str(), Some("Ada"));
}

// ── Relationships and deletion ───────────────────────────────────

#[test]
fn delete_cascades_and_nullifies_inbound_relationships() {
    let mut store = store();
    let a = store.create("document");
    let b = store.create("person");
    let a_ref = store.reference_to(a);
    let b_ref = store.reference_to(b);
    store
        .add_value(&a_ref, "owner", PropertyValue::new(b_ref, "relationship"))
        .unwrap();

    assert!(store.delete(b));
    assert_eq!(store.count(), 1);

    let owner = store.read(a, &["owner"]);
    let value = &owner.get("owner").unwrap().value;
    let reference = value.as_reference().unwrap();
    assert!(reference.is_null());
}

#[test]
fn delete_unknown_returns_false() {
    let mut store = store();
    assert!(!store.delete(EntityId::new()));
}

#[test]
fn deleted_record_properties_are_gone() {
    let mut store = store();
    let id = store.create("person");
    let target = store.reference_to(id);
    store.add_value(&target, "name", PropertyValue::untyped("Ada")).unwrap();
    store.delete(id);
    assert!(store.read(id, &["name"]).is_empty());
}

// ── Typed values ─────────────────────────────────────────────────

#[test]
fn all_value_kinds_roundtrip_through_read() {
    let mut store = store();
    let id = store.create("sample");
    let target = store.reference_to(id);
    let stamp = HybridTimestamp::new(1_700_000_000_000, 3);
    let dict: PropertyDictionary = [
        ("s", PropertyValue::untyped("text")),
        ("i", PropertyValue::new(42i64, "count")),
        ("d", PropertyValue::new(2.5f64, "ratio")),
        ("b", PropertyValue::untyped(true)),
        ("t", PropertyValue::untyped(Value::Date(stamp))),
        ("bin", PropertyValue::untyped(Value::Binary(vec![1, 2, 3]))),
    ]
    .into_iter()
    .collect();
    store.add(&target, &dict).unwrap();

    let all = store.read_all(id);
    assert_eq!(all.get("s").unwrap().value.as_str(), Some("text"));
    assert_eq!(all.get("i").unwrap().value.as_integer(), Some(42));
    assert_eq!(all.get("i").unwrap().property_type.as_str(), "count");
    assert_eq!(all.get("d").unwrap().value.as_double(), Some(2.5));
    assert_eq!(all.get("b").unwrap().value.as_boolean(), Some(true));
    assert_eq!(all.get("t").unwrap().value.as_date(), Some(stamp));
    assert_eq!(all.get("bin").unwrap().value.as_binary(), Some(&[1u8, 2, 3][..]));
}

// ── Composite keys ───────────────────────────────────────────────

#[test]
fn composite_key_resolves_to_prefixed_name() {
    let mut store = store();
    let section = store.create("section");
    let page = store.create("page");
    let target = store.reference_to(page);

    let mut dict = PropertyDictionary::new();
    dict.insert(
        PropertyKey::composite("section", store.reference_to(section)),
        PropertyValue::untyped("intro"),
    );
    store.add(&target, &dict).unwrap();

    let name = format!("section-{section}");
    let result = store.read(page, &[name.as_str()]);
    assert_eq!(result.get(&name).unwrap().value.as_str(), Some("intro"));
}

#[test]
fn composite_key_resolution_reports_created_records() {
    let mut store = store();
    let page = store.create("page");
    let target = store.reference_to(page);

    // The embedded reference has no match, so resolving the key itself
    // creates the section; that creation must reach the caller.
    let section = EntityReference::by_name_or_create("Intro", "section");
    let mut dict = PropertyDictionary::new();
    dict.insert(
        PropertyKey::composite("section", section.clone()),
        PropertyValue::untyped("lead"),
    );
    let resolution = store.add(&target, &dict).unwrap();

    assert_eq!(resolution.created.len(), 1);
    let created = resolution.created[0];
    assert_eq!(section.resolved_id(), Some(created));

    let name = format!("section-{created}");
    let result = store.read(page, &[name.as_str()]);
    assert_eq!(result.get(&name).unwrap().value.as_str(), Some("lead"));
}

// ── Notifications ────────────────────────────────────────────────

#[test]
fn create_emits_add_notification() {
    let mut store = store();
    let seen = watch(&mut store);
    let id = store.create("person");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].action, ChangeAction::Add);
    assert!(seen[0].added.contains(&id));
}

#[test]
fn update_and_remove_emit_matching_actions() {
    let mut store = store();
    let id = store.create("person");
    let target = store.reference_to(id);
    let seen = watch(&mut store);

    store.add_value(&target, "name", PropertyValue::untyped("Ada")).unwrap();
    store.remove(id, &["name"]);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].action, ChangeAction::Update);
    assert!(seen[0].changed.contains(&id));
    assert!(seen[0].keys.contains("name"));
    assert_eq!(seen[1].action, ChangeAction::Remove);
}

#[test]
fn no_effect_operations_emit_nothing() {
    let mut store = store();
    let id = store.create("person");
    let seen = watch(&mut store);

    store.read(id, &["never-set"]);
    store.remove(id, &["never-set"]);
    store.delete(EntityId::new());
    store.resolve(&EntityReference::by_name("nobody"));

    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn suspension_coalesces_store_notifications() {
    let mut store = store();
    let seen = watch(&mut store);

    store.suspend_notifications();
    let a = store.create("person");
    let b = store.create("person");
    assert!(seen.lock().unwrap().is_empty());
    store.resume_notifications();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].added.contains(&a) && seen[0].added.contains(&b));
}

// ── Counting ─────────────────────────────────────────────────────

#[test]
fn count_where_scans_newest_values() {
    let mut store = store();
    let a = store.create("person");
    let b = store.create("person");
    let a_ref = store.reference_to(a);
    let b_ref = store.reference_to(b);
    store.add_value(&a_ref, "city", PropertyValue::untyped("London")).unwrap();
    store.add_value(&b_ref, "city", PropertyValue::untyped("London")).unwrap();
    store.add_value(&b_ref, "city", PropertyValue::untyped("Paris")).unwrap();

    assert_eq!(store.count_where("city", "London"), 1);
    assert_eq!(store.count_where("city", "Paris"), 1);
    assert_eq!(store.count(), 2);
}

#[test]
fn conformance_closure_is_built_from_config() {
    use tessera_store::ConformanceEdge;
    use tessera_types::EntityType;

    let config = StoreConfig {
        conformances: vec![
            ConformanceEdge {
                entity_type: EntityType::from("employee"),
                conforms_to: vec![EntityType::from("person")],
            },
            ConformanceEdge {
                entity_type: EntityType::from("manager"),
                conforms_to: vec![EntityType::from("employee")],
            },
        ],
        default_property_type: Default::default(),
    };
    let store = Store::new(config);
    let map = store.conformance();
    assert!(map.conforms_to(&EntityType::from("manager"), &EntityType::from("person")));
    assert!(!map.conforms_to(&EntityType::from("person"), &EntityType::from("manager")));
}

#[test]
fn save_succeeds_on_memory_backend() {
    let mut store = store();
    store.create("person");
    assert!(store.save().is_ok());
}

/// Delegates everything to the in-memory backend except `save`, which
/// always fails.
struct UnsavableBackend {
    inner: MemoryBackend,
}

impl StorageBackend for UnsavableBackend {
    fn affinity(&self) -> AffinityId {
        self.inner.affinity()
    }

    fn create(&mut self, entity_type: &EntityType) -> EntityId {
        self.inner.create(entity_type)
    }

    fn create_with_identifier(
        &mut self,
        entity_type: &EntityType,
        id: EntityId,
        created_at: Option<HybridTimestamp>,
    ) -> EntityId {
        self.inner.create_with_identifier(entity_type, id, created_at)
    }

    fn fetch_by_identifier(&self, id: EntityId) -> Option<&EntityRecord> {
        self.inner.fetch_by_identifier(id)
    }

    fn fetch_by_identifier_mut(&mut self, id: EntityId) -> Option<&mut EntityRecord> {
        self.inner.fetch_by_identifier_mut(id)
    }

    fn fetch_all_identifiers(&self) -> Vec<EntityId> {
        self.inner.fetch_all_identifiers()
    }

    fn delete(&mut self, id: EntityId) -> bool {
        self.inner.delete(id)
    }

    fn save(&mut self) -> StorageResult<()> {
        Err(StorageError::SaveFailure("disk full".to_string()))
    }

    fn count(&self) -> usize {
        self.inner.count()
    }
}

#[test]
fn save_failure_surfaces_synchronously() {
    let backend = UnsavableBackend {
        inner: MemoryBackend::new(),
    };
    let mut store = Store::with_backend(Box::new(backend), StoreConfig::default());
    store.create("person");

    let err = store.save().unwrap_err();
    assert!(matches!(err, StorageError::SaveFailure(_)));
    // The failure does not disturb the in-memory state.
    assert_eq!(store.count(), 1);
}

// ── Properties ───────────────────────────────────────────────────

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn last_write_always_wins(values in proptest::collection::vec("[a-z]{1,8}", 1..16)) {
            let mut store = store();
            let id = store.create("person");
            let target = store.reference_to(id);
            for v in &values {
                store.add_value(&target, "k", PropertyValue::untyped(v.as_str())).unwrap();
            }
            let result = store.read(id, &["k"]);
            prop_assert_eq!(
                result.get("k").unwrap().value.as_str(),
                Some(values.last().unwrap().as_str())
            );
        }

        #[test]
        fn remove_erases_arbitrary_history(n in 1usize..20) {
            let mut store = store();
            let id = store.create("person");
            let target = store.reference_to(id);
            for i in 0..n {
                store.add_value(&target, "k", PropertyValue::untyped(i as i64)).unwrap();
            }
            prop_assert_eq!(store.remove(id, &["k"]), n);
            prop_assert!(store.read_all(id).is_empty());
        }
    }
}
