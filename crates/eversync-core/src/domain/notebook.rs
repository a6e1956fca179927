//! Notebook entity

use serde::{Deserialize, Serialize};

use super::newtypes::{Guid, LocalId, Usn};

/// A notebook, either in the user's own account or in a linked notebook
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    /// Client-side identifier, always present
    #[serde(default)]
    pub local_id: LocalId,
    /// Remote identifier, absent until first successful upload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<Guid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_sequence_num: Option<Usn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Present when this notebook belongs to a linked notebook scope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_notebook_guid: Option<Guid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_notebook: Option<bool>,
    #[serde(default)]
    pub locally_modified: bool,
    #[serde(default)]
    pub locally_favorited: bool,
}

impl Notebook {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            local_id: LocalId::generate(),
            name: Some(name.into()),
            locally_modified: true,
            ..Default::default()
        }
    }
}
