//! Note and resource attribute blocks

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::newtypes::Guid;

/// Optional metadata attached to a note
///
/// Mirrors the service's note attributes structure; only fields the engine
/// or the ENEX transcoder touch are carried. `application_data` is the
/// full key-value map requested via the sync chunk filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_date: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_application: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder_order: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder_done_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_data: Option<HashMap<String, String>>,
    /// Set on local duplicates created during resource conflict handling;
    /// points back at the note the duplicate was forked from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_source_note_guid: Option<Guid>,
}

impl NoteAttributes {
    /// True if any field worth serializing into ENEX is set
    pub fn is_empty(&self) -> bool {
        self.subject_date.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
            && self.altitude.is_none()
            && self.author.is_none()
            && self.source.is_none()
            && self.source_url.is_none()
            && self.source_application.is_none()
            && self.reminder_order.is_none()
            && self.reminder_done_time.is_none()
            && self.reminder_time.is_none()
            && self.place_name.is_none()
            && self.content_class.is_none()
            && self.application_data.is_none()
    }
}

/// Optional metadata attached to a resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_make: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reco_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_data: Option<HashMap<String, String>>,
}

impl ResourceAttributes {
    pub fn is_empty(&self) -> bool {
        self.source_url.is_none()
            && self.timestamp.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
            && self.altitude.is_none()
            && self.camera_make.is_none()
            && self.reco_type.is_none()
            && self.file_name.is_none()
            && self.attachment.is_none()
            && self.application_data.is_none()
    }
}
