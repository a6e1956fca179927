//! Note entity

use serde::{Deserialize, Serialize};

use super::attributes::NoteAttributes;
use super::newtypes::{Guid, LocalId, Usn};
use super::resource::Resource;

/// A note with its content, tag references and resources
///
/// A note must carry `notebook_guid` or `notebook_local_id` (or both);
/// the binding cannot be lost. Sync chunks deliver notes without content
/// and without resource bodies; the full data arrives via a separate
/// per-note download.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Note {
    #[serde(default)]
    pub local_id: LocalId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<Guid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_sequence_num: Option<Usn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// ENML document string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notebook_guid: Option<Guid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notebook_local_id: Option<LocalId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tag_guids: Vec<Guid>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tag_local_ids: Vec<LocalId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<Resource>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<NoteAttributes>,
    /// 300px PNG thumbnail bytes, fetched during download when enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_data: Option<Vec<u8>>,
    #[serde(default)]
    pub locally_modified: bool,
    #[serde(default)]
    pub locally_favorited: bool,
}

impl Note {
    pub fn new() -> Self {
        Self {
            local_id: LocalId::generate(),
            locally_modified: true,
            ..Default::default()
        }
    }

    /// Mutable access to attributes, creating the block on first use
    pub fn attributes_mut(&mut self) -> &mut NoteAttributes {
        self.attributes.get_or_insert_with(NoteAttributes::default)
    }

    /// The first ink note resource with the fields a raster download needs
    pub fn ink_note_resource(&self) -> Option<&Resource> {
        self.resources.as_ref()?.iter().find(|r| {
            r.guid.is_some() && r.width.is_some() && r.height.is_some() && r.is_ink_note()
        })
    }
}
