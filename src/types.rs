//! Core data types for git-tkt tickets.

use crate::id::TicketId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Field names computed by the store. They are never persisted.
pub const RESERVED_FIELD_NAMES: [&str; 3] = ["uuid", "num", "creation_date"];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_FIELD_NAMES.contains(&name)
}

/// Ordered field name → value mapping.
///
/// Insertion order is preserved through serialization. Setting an existing
/// name replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMap(IndexMap<String, String>);

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Insert or replace a value, returning the previous one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(name.into(), value.into())
    }

    /// Remove a field, keeping the order of the rest.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.shift_remove(name)
    }

    /// Drop every reserved name.
    pub fn strip_reserved(&mut self) {
        self.0.retain(|k, _| !is_reserved(k));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// On-disk form of a ticket: `<folder>/<ticket id>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredRecord {
    pub creation_date: String,
    pub fields: FieldMap,
}

/// A ticket as returned to callers.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    /// Global ID, stable for the ticket's lifetime
    pub id: TicketId,

    /// Local number within the folder
    pub num: u64,

    /// When the ticket was created
    pub creation_date: String,

    /// Schema-driven fields, reserved names excluded
    pub fields: FieldMap,
}

impl Ticket {
    /// Fields with the derived `num`, `uuid` and `creation_date` injected.
    pub fn with_derived_fields(&self) -> FieldMap {
        let mut out = self.fields.clone();
        out.set("num", self.num.to_string());
        out.set("uuid", self.id.as_str());
        out.set("creation_date", self.creation_date.as_str());
        out
    }
}

/// Result of listing a folder.
#[derive(Debug, Clone, PartialEq)]
pub enum Listing {
    /// The folder has no numbered tickets (or was never written).
    Empty,
    /// Tickets in assignment order.
    Tickets(Vec<Ticket>),
}

impl Listing {
    pub fn tickets(&self) -> &[Ticket] {
        match self {
            Listing::Empty => &[],
            Listing::Tickets(t) => t,
        }
    }
}

/// Validation errors for caller input and field schemas.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    MissingField(String),
    ReadOnlyField(String),
    ReservedField(String),
    DuplicateField(String),
    EmptyFieldName,
    InvalidFolder(String),
    MalformedKey(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::MissingField(name) => {
                write!(f, "no value for field '{}'; set one with --set {}=<value>", name, name)
            }
            ValidationError::ReadOnlyField(name) => write!(f, "field '{}' is not editable", name),
            ValidationError::ReservedField(name) => {
                write!(f, "'{}' is a reserved field name", name)
            }
            ValidationError::DuplicateField(name) => {
                write!(f, "field '{}' is defined more than once", name)
            }
            ValidationError::EmptyFieldName => write!(f, "field name cannot be empty"),
            ValidationError::InvalidFolder(name) => {
                write!(f, "invalid folder name '{}': must be a single path component", name)
            }
            ValidationError::MalformedKey(key) => {
                write!(f, "'{}' is neither a ticket number nor a ticket id", key)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Check that a folder name is a single, non-empty tree path component.
pub fn validate_folder(name: &str) -> Result<(), ValidationError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.chars().any(|c| c.is_control())
    {
        return Err(ValidationError::InvalidFolder(name.to_string()));
    }
    Ok(())
}
