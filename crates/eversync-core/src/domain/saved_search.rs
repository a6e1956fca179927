//! Saved search entity

use serde::{Deserialize, Serialize};

use super::newtypes::{Guid, LocalId, Usn};

/// A saved search query; flat collection, user-own scope only
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedSearch {
    #[serde(default)]
    pub local_id: LocalId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<Guid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_sequence_num: Option<Usn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default)]
    pub locally_modified: bool,
    #[serde(default)]
    pub locally_favorited: bool,
}

impl SavedSearch {
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            local_id: LocalId::generate(),
            name: Some(name.into()),
            query: Some(query.into()),
            locally_modified: true,
            ..Default::default()
        }
    }
}
