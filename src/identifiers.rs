//! Type-safe identifiers for protocol entities.
//!
//! See ARCHITECTURE.md Section 2.1 for the id allocation rules.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// MessageId
// ============================================================================

/// Correlation id for one request/response exchange.
///
/// Ids are allocated by the pending-message table from a monotonic
/// per-table counter and rendered as strings on the wire (`"1"`, `"2"`,
/// ...). An id is never reused within one connection instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Creates a message id from an arbitrary string.
    ///
    /// Intended for frames built outside a pending table (tests, peers).
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Renders a counter value as a wire id.
    #[inline]
    #[must_use]
    pub(crate) fn from_seq(seq: u64) -> Self {
        Self(seq.to_string())
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
