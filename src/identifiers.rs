//! Type-safe identifiers.
//!
//! Newtype wrappers prevent mixing call ids with peer ids at compile time.
//!
//! | Type | Inner | Source |
//! |------|-------|--------|
//! | [`CallId`] | `Uuid` (v4) | Generated by the relay for every submitted call |
//! | [`PeerId`] | `u64` | Assigned to each admitted agent connection |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// CallId
// ============================================================================

/// Correlation id for one outstanding call.
///
/// Random v4 UUIDs are unguessable and never repeat during a process
/// lifetime, so an id is never reused while its call is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(Uuid);

impl CallId {
    /// Generates a fresh random id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// PeerId
// ============================================================================

/// Global counter for peer ids.
static NEXT_PEER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one admitted agent connection.
///
/// Used to ignore close callbacks and frames from a connection that is no
/// longer the registered peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(u64);

impl PeerId {
    /// Allocates the next peer id.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_PEER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the numeric value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_ids_are_unique() {
        let a = CallId::generate();
        let b = CallId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn test_call_id_serializes_as_string() {
        let id = CallId::generate();
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, format!("\"{id}\""));

        let back: CallId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }

    #[test]
    fn test_peer_ids_increase() {
        let a = PeerId::next();
        let b = PeerId::next();
        assert!(b > a);
        assert!(b.to_string().starts_with("peer-"));
    }
}
