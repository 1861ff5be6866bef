//! Change notifications emitted after store operations.
//!
//! Every batch operation with an observable effect produces exactly one
//! notification; no-effect operations produce nothing. During a bulk
//! import, notifications are suspended and coalesced into one batch so
//! listeners observe the import as a single change.

use crate::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The kind of operation a notification reports.
///
/// Ordered by significance: when notifications are coalesced, the merged
/// batch carries the most significant action present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Get,
    Update,
    Add,
    Remove,
    Delete,
}

impl ChangeAction {
    const fn rank(self) -> u8 {
        match self {
            Self::Get => 0,
            Self::Update => 1,
            Self::Add => 2,
            Self::Remove => 3,
            Self::Delete => 4,
        }
    }

    /// Returns the more significant of two actions.
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }
}

/// A notification describing the net effect of one store operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    /// The operation kind.
    pub action: ChangeAction,
    /// Records created by the operation (including side-effect creations).
    pub added: BTreeSet<EntityId>,
    /// Records deleted by the operation.
    pub deleted: BTreeSet<EntityId>,
    /// Records whose properties changed.
    pub changed: BTreeSet<EntityId>,
    /// Names of the property keys touched.
    pub keys: BTreeSet<String>,
}

impl ChangeNotification {
    /// Creates an empty notification for the given action.
    #[must_use]
    pub fn new(action: ChangeAction) -> Self {
        Self {
            action,
            added: BTreeSet::new(),
            deleted: BTreeSet::new(),
            changed: BTreeSet::new(),
            keys: BTreeSet::new(),
        }
    }

    /// Adds a created record.
    #[must_use]
    pub fn with_added(mut self, id: EntityId) -> Self {
        self.added.insert(id);
        self
    }

    /// Adds a deleted record.
    #[must_use]
    pub fn with_deleted(mut self, id: EntityId) -> Self {
        self.deleted.insert(id);
        self
    }

    /// Adds a changed record.
    #[must_use]
    pub fn with_changed(mut self, id: EntityId) -> Self {
        self.changed.insert(id);
        self
    }

    /// Adds a touched key name.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.keys.insert(key.into());
        self
    }

    /// True if the notification reports no observable effect.
    ///
    /// Empty notifications are never delivered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.deleted.is_empty()
            && self.changed.is_empty()
            && self.keys.is_empty()
    }

    /// Merges another notification into this one (set union; the more
    /// significant action wins).
    pub fn merge(&mut self, other: &Self) {
        self.action = self.action.max(other.action);
        self.added.extend(other.added.iter().copied());
        self.deleted.extend(other.deleted.iter().copied());
        self.changed.extend(other.changed.iter().copied());
        self.keys.extend(other.keys.iter().cloned());
    }
}
