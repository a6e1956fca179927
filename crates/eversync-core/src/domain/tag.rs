//! Tag entity

use serde::{Deserialize, Serialize};

use super::newtypes::{Guid, LocalId, Usn};

/// A tag; tags form a tree via `parent_guid` / `parent_tag_local_id`
///
/// A tag must not be its own ancestor. The sender relies on the parent
/// linkage to upload parents before children.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(default)]
    pub local_id: LocalId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<Guid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_sequence_num: Option<Usn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_guid: Option<Guid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_tag_local_id: Option<LocalId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_notebook_guid: Option<Guid>,
    #[serde(default)]
    pub locally_modified: bool,
    #[serde(default)]
    pub locally_favorited: bool,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            local_id: LocalId::generate(),
            name: Some(name.into()),
            locally_modified: true,
            ..Default::default()
        }
    }
}
