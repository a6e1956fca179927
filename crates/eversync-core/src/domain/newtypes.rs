//! Identifier newtypes
//!
//! Two identifier spaces coexist for every synchronized entity:
//!
//! - [`Guid`] - the identifier assigned by the remote service once an entity
//!   has been uploaded. Absent for entities that only exist locally.
//! - [`LocalId`] - the identifier assigned by this client at creation time.
//!   Always present, never changes, survives conflict renames and full-data
//!   re-downloads.
//!
//! [`Usn`] is the update sequence number: a monotonically increasing integer
//! the service assigns per change within one scope (the user's own account
//! or a single linked notebook).

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Update sequence number within a single synchronization scope
pub type Usn = i32;

/// Remote identifier assigned by the service
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Guid(String);

impl Guid {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Guid {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for Guid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Client-side identifier, generated at entity creation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(String);

impl LocalId {
    /// Generates a fresh random local id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LocalId {
    fn default() -> Self {
        Self::generate()
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LocalId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}
