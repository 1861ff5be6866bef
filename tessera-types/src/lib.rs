//! Core type definitions for Tessera.
//!
//! This crate defines the fundamental, engine-agnostic types used throughout
//! the object store:
//! - Entity identifiers (UUID v7)
//! - Hybrid Logical Clock timestamps with a sortable textual wire form
//! - Semantic string tags for entity and property types
//! - Change notifications emitted after batch operations
//!
//! Everything that touches records, resolution, or storage belongs in
//! `tessera-store`, not here.

mod ids;
mod notification;
mod tags;
mod timestamp;

pub use ids::EntityId;
pub use notification::{ChangeAction, ChangeNotification};
pub use tags::{EntityType, PropertyType};
pub use timestamp::HybridTimestamp;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
