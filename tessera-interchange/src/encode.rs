//! Store → document encoding.
//!
//! Full fidelity: every record, every property name, every historical
//! version. A name with one surviving version encodes as a single
//! normalized object; a name with several encodes as an array, oldest
//! first. Relationships are shallow (the target's identifier string);
//! versions whose target was nullified are dropped.

use crate::{Document, InterchangeResult};
use base64::Engine as _;
use serde_json::{Map, Value};
use tessera_store::{
    EntityRecord, PropertyRecord, Store, StoredValue, RESERVED_DATESTAMP, RESERVED_IDENTIFIER,
    RESERVED_TYPE,
};

/// Encodes the whole store as one interchange document.
#[must_use]
pub fn encode(store: &Store) -> Document {
    let mut document = Document::default();
    for id in store.identifiers() {
        if let Some(record) = store.record(id) {
            document.entities.push(encode_record(record));
        }
    }
    document
}

/// Encodes the whole store directly to JSON text.
pub fn encode_json(store: &Store) -> InterchangeResult<String> {
    encode(store).to_json()
}

fn encode_record(record: &EntityRecord) -> Map<String, Value> {
    let mut entry = Map::new();
    entry.insert(
        RESERVED_IDENTIFIER.to_string(),
        Value::String(record.identifier().to_string()),
    );
    entry.insert(
        RESERVED_TYPE.to_string(),
        Value::String(record.entity_type().as_str().to_string()),
    );
    entry.insert(
        RESERVED_DATESTAMP.to_string(),
        Value::String(record.created_at().encode()),
    );

    for name in record.names_used() {
        let versions: Vec<Value> = record
            .versions(&name)
            .into_iter()
            .filter_map(encode_version)
            .collect();
        match versions.len() {
            0 => {}
            1 => {
                let mut versions = versions;
                entry.insert(name, versions.remove(0));
            }
            _ => {
                entry.insert(name, Value::Array(versions));
            }
        }
    }
    entry
}

/// One property version in the normalized shape, or `None` for versions
/// that do not travel (nullified relationships, non-finite doubles).
fn encode_version(property: &PropertyRecord) -> Option<Value> {
    let payload = match &property.value {
        StoredValue::String(s) => Value::String(s.clone()),
        StoredValue::Integer(i) => Value::from(*i),
        StoredValue::Double(d) => {
            if !d.is_finite() {
                return None;
            }
            Value::from(*d)
        }
        StoredValue::Boolean(b) => Value::Bool(*b),
        StoredValue::Date(d) => Value::String(d.encode()),
        StoredValue::Binary(bytes) => {
            Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
        }
        StoredValue::Relationship(Some(target)) => Value::String(target.to_string()),
        StoredValue::Relationship(None) => return None,
    };

    let mut shape = Map::new();
    shape.insert(kind_key(&property.value).to_string(), payload);
    shape.insert(
        RESERVED_TYPE.to_string(),
        Value::String(property.property_type.as_str().to_string()),
    );
    shape.insert(
        RESERVED_DATESTAMP.to_string(),
        Value::String(property.timestamp.encode()),
    );
    Some(Value::Object(shape))
}

fn kind_key(value: &StoredValue) -> &'static str {
    value.kind().as_str()
}
