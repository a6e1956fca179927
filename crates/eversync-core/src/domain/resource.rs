//! Resource (attachment) entity

use serde::{Deserialize, Serialize};

use super::attributes::ResourceAttributes;
use super::data::Data;
use super::newtypes::{Guid, LocalId, Usn};

/// Mime type the service uses for ink note rasters
pub const INK_NOTE_MIME_TYPE: &str = "application/vnd.evernote.ink";

/// A binary attachment belonging to exactly one note
///
/// The note binding (`note_guid` or `note_local_id`, at least one) must
/// never be lost: a persisted resource without it is a protocol violation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(default)]
    pub local_id: LocalId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<Guid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_sequence_num: Option<Usn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_guid: Option<Guid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_local_id: Option<LocalId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Data>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recognition: Option<Data>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternate_data: Option<Data>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<i16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<i16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<ResourceAttributes>,
    #[serde(default)]
    pub locally_modified: bool,
}

impl Resource {
    pub fn new() -> Self {
        Self {
            local_id: LocalId::generate(),
            locally_modified: true,
            ..Default::default()
        }
    }

    /// True for ink note rasters which get a PNG rendering saved on disk
    pub fn is_ink_note(&self) -> bool {
        self.mime.as_deref() == Some(INK_NOTE_MIME_TYPE)
    }
}
