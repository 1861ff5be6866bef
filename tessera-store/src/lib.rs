//! Entity/property data model and resolution engine for Tessera.
//!
//! Tessera is a schema-less object store: entities of dynamic type carry an
//! open-ended, versioned set of typed properties. This crate holds the core:
//! - [`EntityRecord`] — the persisted entity with append-only property
//!   versioning and newest-wins reads
//! - [`PropertyValue`] / [`PropertyDictionary`] — the values crossing the
//!   API boundary
//! - [`EntityReference`] — a deferred handle resolved lazily through
//!   matchers, with optional auto-creation
//! - [`StorageBackend`] — the persistence contract, plus the in-memory
//!   reference implementation [`MemoryBackend`]
//! - [`Store`] — the façade tying records, resolution, conformance, and
//!   change notifications together
//! - [`StoreHandle`] — a clonable async handle serializing all operations
//!   onto one worker task per store

mod backend;
mod config;
mod conformance;
mod notify;
mod record;
mod reference;
mod resolve;
mod store;
mod value;
mod worker;

pub use backend::{AffinityId, MemoryBackend, StorageBackend, StorageError, StorageResult};
pub use config::{ConformanceEdge, StoreConfig};
pub use conformance::ConformanceMap;
pub use notify::NotificationHub;
pub use record::{
    is_reserved, EntityRecord, PropertyRecord, StorageKind, StoredValue, RESERVED_DATESTAMP,
    RESERVED_IDENTIFIER, RESERVED_TYPE,
};
pub use reference::{
    EntityInitializer, EntityMatcher, EntityReference, PropertyKey, ResolverState,
};
pub use resolve::Resolution;
pub use store::Store;
pub use value::{PropertyDictionary, PropertyValue, Value};
pub use worker::StoreHandle;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the store façade.
///
/// "Not found" is not listed here: lookup-style operations degrade to empty
/// results (`None` / empty dictionaries) rather than failing.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("unknown entity: {0}")]
    UnknownEntity(tessera_types::EntityId),

    #[error(transparent)]
    Types(#[from] tessera_types::Error),
}
