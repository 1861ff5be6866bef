//! Flat JSON interchange codec for Tessera stores.
//!
//! A store serializes to a single document, `{"entities": [...]}`, where
//! each entry carries the record's reserved fields plus every property
//! name with its full version history. Decoding the same document back is
//! idempotent at the entity level: records are found or created by
//! identifier, and property versions append rather than duplicate.
//!
//! Attribute values travel in one of two shapes:
//! - **normalized** — `{"<kind>": <value>, "type": ..., "datestamp": ...}`
//!   with the kind key naming the storage kind on the wire
//! - **compact** — a bare JSON scalar, decoded by kind probing and tagged
//!   with the store's default property type

mod decode;
mod document;
mod encode;

pub use decode::{decode, decode_json, DecodeCache, DecodeReport};
pub use document::Document;
pub use encode::{encode, encode_json};

/// Result type alias for interchange operations.
pub type InterchangeResult<T> = std::result::Result<T, InterchangeError>;

/// Errors surfaced by the interchange codec.
///
/// A malformed top-level document aborts the whole pass; malformed
/// individual entity entries are skipped with a warning instead.
#[derive(Debug, thiserror::Error)]
pub enum InterchangeError {
    #[error("malformed interchange document: {0}")]
    MalformedDocument(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] tessera_store::StoreError),
}
