//! Store configuration.

use serde::{Deserialize, Serialize};
use tessera_types::{EntityType, PropertyType};

/// One declared conformance: `entity_type` conforms to each listed type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConformanceEdge {
    pub entity_type: EntityType,
    pub conforms_to: Vec<EntityType>,
}

/// Configuration supplied when opening a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Declared type-conformance edges; the transitive closure is computed
    /// once at open.
    #[serde(default)]
    pub conformances: Vec<ConformanceEdge>,

    /// The property type assigned to values written without an explicit
    /// declared type.
    #[serde(default)]
    pub default_property_type: PropertyType,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            conformances: Vec::new(),
            default_property_type: PropertyType::default(),
        }
    }
}
