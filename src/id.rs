//! Ticket identifiers: the random global ID and the lookup key parser.

use crate::types::ValidationError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Keys shorter than this are treated as local numbers, longer ones as
/// global IDs. A canonical global ID is 36 characters.
pub const MIN_GLOBAL_ID_LEN: usize = 30;

/// Globally unique ticket identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(String);

impl TicketId {
    /// Generate a fresh ID from 128 bits of randomness.
    /// Format: lowercase UUID v4, e.g. "3f2b8c1e-9d4a-4c7b-8e2f-0a1b2c3d4e5f"
    pub fn generate() -> Self {
        let bytes = rand::rng().random::<[u8; 16]>();
        let uuid = uuid::Builder::from_random_bytes(bytes).into_uuid();
        Self(uuid.hyphenated().to_string())
    }

    /// Wrap an existing ID read from storage.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TicketId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A user-supplied reference to a ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketKey {
    /// Folder-scoped sequential number.
    Local(u64),
    /// Global ID, matched as an opaque string.
    Global(TicketId),
}

impl TicketKey {
    /// Classify a key by length, then parse it.
    ///
    /// Short keys must be positive decimal integers.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let raw = raw.trim();
        if raw.len() >= MIN_GLOBAL_ID_LEN {
            return Ok(TicketKey::Global(TicketId::new(raw)));
        }
        match raw.parse::<u64>() {
            Ok(n) if n > 0 => Ok(TicketKey::Local(n)),
            _ => Err(ValidationError::MalformedKey(raw.to_string())),
        }
    }
}

impl fmt::Display for TicketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TicketKey::Local(n) => write!(f, "#{}", n),
            TicketKey::Global(id) => write!(f, "{}", id),
        }
    }
}
