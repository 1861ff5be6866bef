//! The store façade.
//!
//! Ties together the backend, the resolution engine, the conformance map,
//! and change notifications. Every batch operation with an observable
//! effect emits exactly one [`ChangeNotification`]; no-effect operations
//! emit nothing.

use crate::backend::{AffinityId, MemoryBackend, StorageBackend, StorageResult};
use crate::config::StoreConfig;
use crate::conformance::ConformanceMap;
use crate::notify::NotificationHub;
use crate::record::{
    EntityRecord, StoredValue, RESERVED_DATESTAMP, RESERVED_IDENTIFIER, RESERVED_TYPE,
};
use crate::reference::EntityReference;
use crate::resolve::{self, Resolution};
use crate::value::{PropertyDictionary, PropertyValue, Value};
use crate::{StoreError, StoreResult};
use tessera_types::{
    ChangeAction, ChangeNotification, EntityId, EntityType, HybridTimestamp, PropertyType,
};
use tracing::{debug, warn};

/// An embeddable, schema-less object store.
pub struct Store {
    backend: Box<dyn StorageBackend>,
    conformance: ConformanceMap,
    hub: NotificationHub,
    default_property_type: PropertyType,
}

impl Store {
    /// Opens a store over the in-memory reference backend.
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self::with_backend(Box::new(MemoryBackend::new()), config)
    }

    /// Opens a store over an externally provided backend.
    #[must_use]
    pub fn with_backend(backend: Box<dyn StorageBackend>, config: StoreConfig) -> Self {
        let conformance = ConformanceMap::from_edges(
            config
                .conformances
                .into_iter()
                .map(|edge| (edge.entity_type, edge.conforms_to)),
        );
        Self {
            backend,
            conformance,
            hub: NotificationHub::new(),
            default_property_type: config.default_property_type,
        }
    }

    /// The storage affinity of this store instance.
    #[must_use]
    pub fn affinity(&self) -> AffinityId {
        self.backend.affinity()
    }

    /// The transitive type-hierarchy index, built once at open.
    #[must_use]
    pub fn conformance(&self) -> &ConformanceMap {
        &self.conformance
    }

    /// The default property type for values written without one.
    #[must_use]
    pub fn default_property_type(&self) -> &PropertyType {
        &self.default_property_type
    }

    /// Registers a change-notification subscriber.
    pub fn subscribe(&mut self, subscriber: impl Fn(&ChangeNotification) + Send + 'static) {
        self.hub.subscribe(subscriber);
    }

    /// Suspends notification delivery (nestable). Used by bulk imports.
    pub fn suspend_notifications(&mut self) {
        self.hub.suspend();
    }

    /// Releases one suspension, flushing the coalesced batch on the last.
    pub fn resume_notifications(&mut self) {
        self.hub.resume();
    }

    // ── Record lifecycle ─────────────────────────────────────────

    /// Creates a record of the given type (intentional creation path).
    pub fn create(&mut self, entity_type: impl Into<EntityType>) -> EntityId {
        let id = self.backend.create(&entity_type.into());
        self.hub
            .publish(ChangeNotification::new(ChangeAction::Add).with_added(id));
        id
    }

    /// Finds a record by identifier, creating it if absent (import path).
    /// Returns true if a record was created. The type is only applied on
    /// creation; an existing record's type is never overwritten.
    pub fn find_or_create_imported(
        &mut self,
        id: EntityId,
        entity_type: &EntityType,
        created_at: Option<HybridTimestamp>,
    ) -> bool {
        if self.backend.fetch_by_identifier(id).is_some() {
            return false;
        }
        self.backend.create_with_identifier(entity_type, id, created_at);
        self.hub
            .publish(ChangeNotification::new(ChangeAction::Add).with_added(id));
        true
    }

    /// Deletes a record: its owned property records go with it, and every
    /// relationship elsewhere that pointed at it is nullified.
    pub fn delete(&mut self, id: EntityId) -> bool {
        if !self.backend.delete(id) {
            return false;
        }
        let mut notification = ChangeNotification::new(ChangeAction::Delete).with_deleted(id);
        for other in self.backend.fetch_all_identifiers() {
            if let Some(record) = self.backend.fetch_by_identifier_mut(other) {
                if record.nullify_relationships_to(id) {
                    notification.changed.insert(other);
                }
            }
        }
        debug!(%id, nullified = notification.changed.len(), "deleted entity record");
        self.hub.publish(notification);
        true
    }

    /// Flushes to durable storage. Failures surface synchronously; there
    /// is no automatic retry.
    pub fn save(&mut self) -> StorageResult<()> {
        self.backend.save()
    }

    /// Number of records in the store.
    #[must_use]
    pub fn count(&self) -> usize {
        self.backend.count()
    }

    /// Number of records whose newest value for `key` equals `value`.
    /// A full scan, like value matching.
    #[must_use]
    pub fn count_where(&self, key: &str, value: &str) -> usize {
        self.backend
            .fetch_all_identifiers()
            .into_iter()
            .filter_map(|id| self.backend.fetch_by_identifier(id))
            .filter(|record| {
                matches!(
                    record.newest(key).map(|p| &p.value),
                    Some(StoredValue::String(s)) if s == value
                )
            })
            .count()
    }

    /// All record identifiers, in backend iteration order.
    #[must_use]
    pub fn identifiers(&self) -> Vec<EntityId> {
        self.backend.fetch_all_identifiers()
    }

    /// Direct access to a record (encode path and diagnostics).
    #[must_use]
    pub fn record(&self, id: EntityId) -> Option<&EntityRecord> {
        self.backend.fetch_by_identifier(id)
    }

    /// A cached reference to an existing record in this store.
    #[must_use]
    pub fn reference_to(&self, id: EntityId) -> EntityReference {
        EntityReference::cached(self.affinity(), id)
    }

    // ── Resolution ───────────────────────────────────────────────

    /// Resolves a reference. `None` is "no result", a normal outcome.
    /// Side-effect creations are reported in the resolution and in an
    /// `add` notification.
    pub fn resolve(&mut self, reference: &EntityReference) -> Option<Resolution> {
        let resolution = resolve::resolve(self.backend.as_mut(), reference)?;
        if !resolution.created.is_empty() {
            let mut notification = ChangeNotification::new(ChangeAction::Add);
            notification.added.extend(resolution.created.iter().copied());
            self.hub.publish(notification);
        }
        Some(resolution)
    }

    // ── Property writes ──────────────────────────────────────────

    /// Applies a dictionary to the record a reference resolves to.
    ///
    /// Composite keys resolve their embedded references first; relationship
    /// values resolve (and possibly create) their targets. The returned
    /// resolution's `created` list covers the target itself (when the
    /// reference auto-created it) plus every side-effect creation.
    pub fn add(
        &mut self,
        target: &EntityReference,
        properties: &PropertyDictionary,
    ) -> Option<Resolution> {
        let resolution = resolve::resolve(self.backend.as_mut(), target)?;
        let outcome = resolve::apply_dictionary(self.backend.as_mut(), resolution.id, properties);

        let mut created = resolution.created;
        created.extend(outcome.created);

        let action = if created.is_empty() {
            ChangeAction::Update
        } else {
            ChangeAction::Add
        };
        let mut notification = ChangeNotification::new(action).with_changed(resolution.id);
        notification.added.extend(created.iter().copied());
        notification.keys.extend(outcome.keys.iter().cloned());
        self.hub.publish(notification);

        Some(Resolution {
            id: resolution.id,
            created,
        })
    }

    /// Writes a single property value.
    pub fn add_value(
        &mut self,
        target: &EntityReference,
        name: &str,
        value: PropertyValue,
    ) -> Option<Resolution> {
        let dict: PropertyDictionary = [(name, value)].into_iter().collect();
        self.add(target, &dict)
    }

    /// Resolves a reference and applies its pending-updates dictionary,
    /// if any.
    pub fn commit(&mut self, reference: &mut EntityReference) -> Option<Resolution> {
        match reference.take_pending() {
            Some(pending) => self.add(&reference.clone(), &pending),
            None => self.resolve(reference),
        }
    }

    /// Appends a property version with an explicit timestamp, bypassing
    /// reference resolution (import path: relationship targets arrive as
    /// raw identifiers).
    pub fn append_historical(
        &mut self,
        id: EntityId,
        name: &str,
        property_type: PropertyType,
        timestamp: Option<HybridTimestamp>,
        value: StoredValue,
    ) -> StoreResult<()> {
        if crate::record::is_reserved(name) {
            warn!(key = name, "reserved keys are derived, never stored; skipping");
            return Ok(());
        }
        let record = self
            .backend
            .fetch_by_identifier_mut(id)
            .ok_or(StoreError::UnknownEntity(id))?;
        match timestamp {
            Some(ts) => record.append_at(name, property_type, ts, value),
            None => {
                record.append(name, property_type, value);
            }
        }
        self.hub.publish(
            ChangeNotification::new(ChangeAction::Update)
                .with_changed(id)
                .with_key(name),
        );
        Ok(())
    }

    // ── Property reads ───────────────────────────────────────────

    /// Reads the newest value for each requested name. Names with no
    /// records are absent from the result. The reserved keys
    /// `identifier`, `type`, and `datestamp` are derived from record
    /// fields and returned only when explicitly requested.
    pub fn read(&mut self, id: EntityId, names: &[&str]) -> PropertyDictionary {
        let affinity = self.affinity();
        let Some(record) = self.backend.fetch_by_identifier(id) else {
            return PropertyDictionary::new();
        };

        let mut dict = PropertyDictionary::new();
        for name in names {
            if let Some(value) = Self::read_one(record, affinity, name) {
                dict.insert((*name).into(), value);
            }
        }

        if !dict.is_empty() {
            let mut notification = ChangeNotification::new(ChangeAction::Get);
            notification.keys.extend(names.iter().map(|n| (*n).to_string()));
            self.hub.publish(notification);
        }
        dict
    }

    /// Reads the newest value for every name ever used on the record.
    /// Reserved keys are not included.
    pub fn read_all(&mut self, id: EntityId) -> PropertyDictionary {
        let affinity = self.affinity();
        let Some(record) = self.backend.fetch_by_identifier(id) else {
            return PropertyDictionary::new();
        };

        let names = record.names_used();
        let mut dict = PropertyDictionary::new();
        for name in &names {
            if let Some(value) = Self::read_one(record, affinity, name) {
                dict.insert(name.as_str().into(), value);
            }
        }

        if !dict.is_empty() {
            let mut notification = ChangeNotification::new(ChangeAction::Get);
            notification.keys.extend(names);
            self.hub.publish(notification);
        }
        dict
    }

    fn read_one(record: &EntityRecord, affinity: AffinityId, name: &str) -> Option<PropertyValue> {
        match name {
            RESERVED_IDENTIFIER => Some(PropertyValue::with_timestamp(
                record.identifier().to_string(),
                RESERVED_IDENTIFIER,
                record.created_at(),
            )),
            RESERVED_TYPE => Some(PropertyValue::with_timestamp(
                record.entity_type().as_str(),
                RESERVED_TYPE,
                record.created_at(),
            )),
            RESERVED_DATESTAMP => Some(PropertyValue::with_timestamp(
                Value::Date(record.created_at()),
                RESERVED_DATESTAMP,
                record.created_at(),
            )),
            _ => {
                let property = record.newest(name)?;
                Some(PropertyValue::with_timestamp(
                    Self::surface(&property.value, affinity),
                    property.property_type.clone(),
                    property.timestamp,
                ))
            }
        }
    }

    /// Converts a stored payload into its caller-facing form.
    fn surface(value: &StoredValue, affinity: AffinityId) -> Value {
        match value {
            StoredValue::String(s) => Value::String(s.clone()),
            StoredValue::Integer(i) => Value::Integer(*i),
            StoredValue::Double(d) => Value::Double(*d),
            StoredValue::Boolean(b) => Value::Boolean(*b),
            StoredValue::Date(d) => Value::Date(*d),
            StoredValue::Binary(b) => Value::Binary(b.clone()),
            StoredValue::Relationship(Some(target)) => {
                Value::Reference(EntityReference::cached(affinity, *target))
            }
            StoredValue::Relationship(None) => Value::Reference(EntityReference::null()),
        }
    }

    // ── Property removal ─────────────────────────────────────────

    /// Deletes every historical version of each given name. Returns the
    /// number of property records removed.
    pub fn remove(&mut self, id: EntityId, names: &[&str]) -> usize {
        let Some(record) = self.backend.fetch_by_identifier_mut(id) else {
            return 0;
        };
        let removed = record.remove(names);
        if removed > 0 {
            let mut notification = ChangeNotification::new(ChangeAction::Remove).with_changed(id);
            notification.keys.extend(names.iter().map(|n| (*n).to_string()));
            self.hub.publish(notification);
        }
        removed
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("affinity", &self.affinity())
            .field("count", &self.count())
            .finish()
    }
}
