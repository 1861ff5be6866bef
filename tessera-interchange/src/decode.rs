//! Document → store decoding.
//!
//! Each entry is found or created by identifier, so decoding the same
//! document twice never duplicates entities — it appends property history.
//! The whole pass runs with store notifications suspended; subscribers see
//! one coalesced batch when it finishes. Malformed entries are skipped
//! with a warning; only a malformed top-level document aborts.

use crate::{Document, InterchangeResult};
use base64::Engine as _;
use serde_json::{Map, Value};
use std::collections::HashSet;
use tessera_store::{is_reserved, Store, StoredValue, RESERVED_DATESTAMP, RESERVED_IDENTIFIER, RESERVED_TYPE};
use tessera_types::{EntityId, EntityType, HybridTimestamp, PropertyType};
use tracing::warn;

/// Identifier-lookup cache for one decode pass.
///
/// Seeded with every identifier in the store when the pass starts and
/// dropped when it ends. A hit means the identifier was already known to
/// this pass; a miss triggers find-or-create; a rewrite is a cache entry
/// installed after a create.
#[derive(Debug, Default)]
pub struct DecodeCache {
    known: HashSet<EntityId>,
    hits: u64,
    misses: u64,
    rewrites: u64,
}

impl DecodeCache {
    fn seeded(identifiers: impl IntoIterator<Item = EntityId>) -> Self {
        Self {
            known: identifiers.into_iter().collect(),
            ..Self::default()
        }
    }

    /// True if the identifier was already known, counting a hit or a miss.
    fn probe(&mut self, id: EntityId) -> bool {
        if self.known.contains(&id) {
            self.hits += 1;
            true
        } else {
            self.misses += 1;
            false
        }
    }

    fn install(&mut self, id: EntityId) {
        self.known.insert(id);
        self.rewrites += 1;
    }

    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits
    }

    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses
    }

    #[must_use]
    pub fn rewrites(&self) -> u64 {
        self.rewrites
    }
}

/// Outcome of one decode pass.
#[derive(Debug, Default)]
pub struct DecodeReport {
    /// Records created by this pass.
    pub created: usize,
    /// Property versions appended.
    pub properties: usize,
    /// Entity entries skipped as malformed.
    pub skipped_entities: usize,
    /// Individual property versions skipped as malformed.
    pub skipped_values: usize,
    /// The pass's identifier cache, with its counters.
    pub cache: DecodeCache,
}

/// Decodes JSON text into the store.
pub fn decode_json(store: &mut Store, json: &str) -> InterchangeResult<DecodeReport> {
    decode(store, &Document::from_json(json)?)
}

/// Decodes a parsed document into the store.
pub fn decode(store: &mut Store, document: &Document) -> InterchangeResult<DecodeReport> {
    let mut cache = DecodeCache::seeded(store.identifiers());
    let mut report = DecodeReport::default();

    store.suspend_notifications();
    let outcome = decode_entries(store, document, &mut cache, &mut report);
    store.resume_notifications();
    outcome?;

    report.cache = cache;
    Ok(report)
}

fn decode_entries(
    store: &mut Store,
    document: &Document,
    cache: &mut DecodeCache,
    report: &mut DecodeReport,
) -> InterchangeResult<()> {
    let default_type = store.default_property_type().clone();

    for entry in &document.entities {
        let Some(id) = entry
            .get(RESERVED_IDENTIFIER)
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<EntityId>().ok())
        else {
            warn!("skipping entity entry without a valid identifier");
            report.skipped_entities += 1;
            continue;
        };
        let Some(entity_type) = entry.get(RESERVED_TYPE).and_then(Value::as_str) else {
            warn!(%id, "skipping entity entry without a type");
            report.skipped_entities += 1;
            continue;
        };
        let created_at = entry
            .get(RESERVED_DATESTAMP)
            .and_then(Value::as_str)
            .and_then(|s| HybridTimestamp::decode(s).ok());

        if !cache.probe(id) {
            if store.find_or_create_imported(id, &EntityType::from(entity_type), created_at) {
                report.created += 1;
            }
            cache.install(id);
        }

        for (name, value) in entry {
            if is_reserved(name) {
                continue;
            }
            let versions: Vec<&Value> = match value {
                Value::Array(items) => items.iter().collect(),
                single => vec![single],
            };
            for version in versions {
                match decode_version(&default_type, version) {
                    Some((property_type, timestamp, stored)) => {
                        store.append_historical(id, name, property_type, timestamp, stored)?;
                        report.properties += 1;
                    }
                    None => {
                        warn!(%id, key = name.as_str(), "skipping malformed property value");
                        report.skipped_values += 1;
                    }
                }
            }
        }
    }
    Ok(())
}

type DecodedVersion = (PropertyType, Option<HybridTimestamp>, StoredValue);

fn decode_version(default_type: &PropertyType, value: &Value) -> Option<DecodedVersion> {
    match value {
        Value::Object(shape) => decode_normalized(default_type, shape),
        compact => {
            let stored = probe_compact(compact)?;
            Some((default_type.clone(), None, stored))
        }
    }
}

/// Compact decoding: kind probing over a bare scalar, fixed order.
///
/// Strings probe as textual timestamp, then bare UUID (decoded as an
/// entity reference — a deliberate, documented ambiguity), then plain
/// string. Binary is never probed here: any string is base64-ambiguous,
/// so `data` only exists in the normalized shape.
fn probe_compact(value: &Value) -> Option<StoredValue> {
    match value {
        Value::Bool(b) => Some(StoredValue::Boolean(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(StoredValue::Integer(i))
            } else {
                n.as_f64().map(StoredValue::Double)
            }
        }
        Value::String(s) => {
            if let Ok(ts) = HybridTimestamp::decode(s) {
                Some(StoredValue::Date(ts))
            } else if let Ok(target) = s.parse::<EntityId>() {
                Some(StoredValue::Relationship(Some(target)))
            } else {
                Some(StoredValue::String(s.clone()))
            }
        }
        _ => None,
    }
}

fn decode_normalized(
    default_type: &PropertyType,
    shape: &Map<String, Value>,
) -> Option<DecodedVersion> {
    let property_type = shape
        .get(RESERVED_TYPE)
        .and_then(Value::as_str)
        .map_or_else(|| default_type.clone(), PropertyType::from);
    let timestamp = shape
        .get(RESERVED_DATESTAMP)
        .and_then(Value::as_str)
        .and_then(|s| HybridTimestamp::decode(s).ok());

    let stored = if let Some(payload) = shape.get("string") {
        StoredValue::String(payload.as_str()?.to_string())
    } else if let Some(payload) = shape.get("integer") {
        StoredValue::Integer(payload.as_i64()?)
    } else if let Some(payload) = shape.get("double") {
        StoredValue::Double(payload.as_f64()?)
    } else if let Some(payload) = shape.get("boolean") {
        StoredValue::Boolean(payload.as_bool()?)
    } else if let Some(payload) = shape.get("date") {
        StoredValue::Date(HybridTimestamp::decode(payload.as_str()?).ok()?)
    } else if let Some(payload) = shape.get("data") {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.as_str()?)
            .ok()?;
        StoredValue::Binary(bytes)
    } else if let Some(payload) = shape.get("entity") {
        match payload {
            Value::Null => StoredValue::Relationship(None),
            Value::String(s) => StoredValue::Relationship(Some(s.parse().ok()?)),
            _ => return None,
        }
    } else {
        return None;
    };

    Some((property_type, timestamp, stored))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_type() -> PropertyType {
        PropertyType::default()
    }

    #[test]
    fn compact_probe_order() {
        assert_eq!(probe_compact(&Value::Bool(true)), Some(StoredValue::Boolean(true)));
        assert_eq!(probe_compact(&Value::from(3i64)), Some(StoredValue::Integer(3)));
        assert_eq!(probe_compact(&Value::from(3.5f64)), Some(StoredValue::Double(3.5)));
        assert_eq!(
            probe_compact(&Value::String("plain".into())),
            Some(StoredValue::String("plain".into()))
        );
    }

    #[test]
    fn compact_string_probes_timestamp_before_uuid_before_string() {
        let ts = HybridTimestamp::new(1_700_000_000_000, 7);
        assert_eq!(
            probe_compact(&Value::String(ts.encode())),
            Some(StoredValue::Date(ts))
        );

        let id = EntityId::new();
        assert_eq!(
            probe_compact(&Value::String(id.to_string())),
            Some(StoredValue::Relationship(Some(id)))
        );
    }

    #[test]
    fn compact_rejects_null_and_nested_arrays() {
        assert!(probe_compact(&Value::Null).is_none());
        assert!(probe_compact(&Value::Array(vec![])).is_none());
    }

    #[test]
    fn normalized_carries_declared_type_and_timestamp() {
        let shape: Map<String, Value> = serde_json::from_str(
            r#"{"string": "123 New St", "type": "address", "datestamp": "1700000000000.000004"}"#,
        )
        .unwrap();
        let (ptype, ts, stored) = decode_normalized(&default_type(), &shape).unwrap();
        assert_eq!(ptype.as_str(), "address");
        assert_eq!(ts, Some(HybridTimestamp::new(1_700_000_000_000, 4)));
        assert_eq!(stored, StoredValue::String("123 New St".into()));
    }

    #[test]
    fn normalized_data_decodes_base64() {
        let shape: Map<String, Value> =
            serde_json::from_str(r#"{"data": "AQID"}"#).unwrap();
        let (_, _, stored) = decode_normalized(&default_type(), &shape).unwrap();
        assert_eq!(stored, StoredValue::Binary(vec![1, 2, 3]));
    }

    #[test]
    fn normalized_without_kind_key_is_malformed() {
        let shape: Map<String, Value> =
            serde_json::from_str(r#"{"type": "address"}"#).unwrap();
        assert!(decode_normalized(&default_type(), &shape).is_none());
    }

    #[test]
    fn normalized_null_entity_is_a_nullified_link() {
        let shape: Map<String, Value> =
            serde_json::from_str(r#"{"entity": null}"#).unwrap();
        let (_, _, stored) = decode_normalized(&default_type(), &shape).unwrap();
        assert_eq!(stored, StoredValue::Relationship(None));
    }
}
