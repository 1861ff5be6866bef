//! Hybrid Logical Clock timestamps for property versioning.
//!
//! Every property write is stamped with one of these; reads select the
//! version with the greatest timestamp (newest wins). Combining physical
//! time with a logical counter keeps stamps strictly increasing even when
//! the system clock has not advanced between two writes.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A Hybrid Logical Clock timestamp.
///
/// Consists of:
/// - `wall_time`: Milliseconds since Unix epoch (physical component)
/// - `logical`: Logical counter for events at the same wall time
///
/// Based on the HLC algorithm from "Logical Physical Clocks" (Kulkarni et al.).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HybridTimestamp {
    /// Physical time component (milliseconds since Unix epoch).
    wall_time: u64,
    /// Logical counter for ordering events at the same wall time.
    logical: u32,
}

impl HybridTimestamp {
    /// Creates a new timestamp at the current time.
    #[must_use]
    pub fn now() -> Self {
        let wall_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before Unix epoch")
            .as_millis() as u64;

        Self {
            wall_time,
            logical: 0,
        }
    }

    /// Creates a timestamp from components.
    #[must_use]
    pub const fn new(wall_time: u64, logical: u32) -> Self {
        Self { wall_time, logical }
    }

    /// Returns the wall time component.
    #[must_use]
    pub const fn wall_time(&self) -> u64 {
        self.wall_time
    }

    /// Returns the logical counter.
    #[must_use]
    pub const fn logical(&self) -> u32 {
        self.logical
    }

    /// Generates the next timestamp, ensuring monotonicity.
    ///
    /// This should be called when stamping a new property version.
    #[must_use]
    pub fn tick(&self) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before Unix epoch")
            .as_millis() as u64;

        if now > self.wall_time {
            Self {
                wall_time: now,
                logical: 0,
            }
        } else {
            Self {
                wall_time: self.wall_time,
                logical: self.logical.saturating_add(1),
            }
        }
    }

    /// Encodes the timestamp in its textual wire form.
    ///
    /// The form is fixed width (`{wall:013}.{logical:06}`), so comparing
    /// two encoded timestamps as strings agrees with comparing the
    /// timestamps themselves. Interchange documents rely on this.
    #[must_use]
    pub fn encode(&self) -> String {
        format!("{:013}.{:06}", self.wall_time, self.logical)
    }

    /// Decodes a timestamp from its textual wire form.
    pub fn decode(s: &str) -> crate::Result<Self> {
        let (wall, logical) = s
            .split_once('.')
            .ok_or_else(|| Error::InvalidTimestamp(s.to_string()))?;
        // Width must match encode() exactly, otherwise ordinary decimals
        // like "3.14" would decode as timestamps.
        if wall.len() != 13 || logical.len() != 6 {
            return Err(Error::InvalidTimestamp(s.to_string()));
        }
        let wall_time: u64 = wall
            .parse()
            .map_err(|_| Error::InvalidTimestamp(s.to_string()))?;
        let logical: u32 = logical
            .parse()
            .map_err(|_| Error::InvalidTimestamp(s.to_string()))?;
        Ok(Self { wall_time, logical })
    }

    /// Returns true if this timestamp is before the other.
    #[must_use]
    pub fn is_before(&self, other: &Self) -> bool {
        self < other
    }

    /// Returns true if this timestamp is after the other.
    #[must_use]
    pub fn is_after(&self, other: &Self) -> bool {
        self > other
    }
}

impl Default for HybridTimestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl fmt::Display for HybridTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl PartialOrd for HybridTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HybridTimestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.wall_time.cmp(&other.wall_time) {
            Ordering::Equal => self.logical.cmp(&other.logical),
            other => other,
        }
    }
}
