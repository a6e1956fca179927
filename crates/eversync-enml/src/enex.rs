//! ENEX import and export
//!
//! ENEX is the interchange format bundling notes with their resources:
//! XML against `evernote-export3.dtd`, binary bodies base64-encoded
//! without line wrapping, timestamps as `yyyyMMdd'T'HHmmss'Z'`. Resource
//! data payloads are capped at 25 MiB.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{NaiveDateTime, TimeZone, Utc};
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::{debug, warn};

use eversync_core::domain::{Data, LocalId, Note, Resource};

use crate::error::EnmlError;
use crate::validate;

const ENEX_DOCTYPE: &str =
    "en-export SYSTEM \"http://xml.evernote.com/pub/evernote-export3.dtd\"";

const ENEX_DATE_TIME_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// 25 MiB; the service rejects anything larger in an export
const ENEX_MAX_RESOURCE_DATA_SIZE: usize = 25 * 1024 * 1024;

/// Export configuration
#[derive(Debug, Clone)]
pub struct EnexExportOptions {
    /// Whether `<tag>` elements are written for each note
    pub export_tags: bool,
    /// Value of the `application` attribute on `en-export`
    pub application: String,
    /// Value of the `version` attribute on `en-export`
    pub version: String,
}

impl Default for EnexExportOptions {
    fn default() -> Self {
        Self {
            export_tags: true,
            application: "Eversync".to_string(),
            version: "1.0".to_string(),
        }
    }
}

/// Everything one ENEX import produced
#[derive(Debug, Default)]
pub struct EnexImportResult {
    pub notes: Vec<Note>,
    /// Tag names seen inside each note, keyed by the note's freshly
    /// assigned local id; the caller resolves them to tag entities
    pub tag_names_by_note_local_id: HashMap<LocalId, Vec<String>>,
}

fn format_timestamp(timestamp_msec: i64) -> String {
    match Utc.timestamp_millis_opt(timestamp_msec).single() {
        Some(datetime) => datetime.format(ENEX_DATE_TIME_FORMAT).to_string(),
        None => {
            warn!(timestamp_msec, "Timestamp out of range, exporting epoch");
            Utc.timestamp_millis_opt(0)
                .single()
                .expect("epoch is representable")
                .format(ENEX_DATE_TIME_FORMAT)
                .to_string()
        }
    }
}

fn parse_timestamp(text: &str, field: &str) -> Result<i64, EnmlError> {
    NaiveDateTime::parse_from_str(text.trim(), ENEX_DATE_TIME_FORMAT)
        .map(|dt| dt.and_utc().timestamp_millis())
        .map_err(|_| {
            EnmlError::Enex(format!("failed to parse timestamp from string for {field}"))
        })
}

// ============================================================================
// Export
// ============================================================================

/// Serializes notes (with their resources) into an ENEX document
///
/// `tag_names_by_tag_local_id` resolves each note's tag local ids to the
/// names written into `<tag>` elements; a missing entry is an error.
pub fn export_notes_to_enex(
    notes: &[Note],
    tag_names_by_tag_local_id: &HashMap<LocalId, String>,
    options: &EnexExportOptions,
) -> Result<String, EnmlError> {
    debug!(note_count = notes.len(), "Exporting notes to ENEX");

    if notes.is_empty() {
        return Err(EnmlError::Enex("can't export notes to ENEX: no notes".into()));
    }

    let exportable = |note: &Note| -> bool {
        note.title.is_some()
            || note.content.is_some()
            || note.resources.as_ref().map_or(false, |r| !r.is_empty())
            || (options.export_tags && !note.tag_local_ids.is_empty())
    };

    if !notes.iter().any(exportable) {
        return Err(EnmlError::Enex(
            "can't export notes to ENEX: no notes eligible for export".into(),
        ));
    }

    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::DocType(BytesText::from_escaped(ENEX_DOCTYPE)))?;

    let mut en_export = BytesStart::new("en-export");
    en_export.push_attribute((
        "export-date",
        format_timestamp(Utc::now().timestamp_millis()).as_str(),
    ));
    en_export.push_attribute(("application", options.application.as_str()));
    en_export.push_attribute(("version", options.version.as_str()));
    writer.write_event(Event::Start(en_export))?;

    for note in notes {
        if !exportable(note) {
            debug!("Skipping note without title, content, resources or tags in ENEX export");
            continue;
        }

        writer.write_event(Event::Start(BytesStart::new("note")))?;

        // Per the DTD, title and content must exist even when empty while
        // created and updated may be absent
        write_text_element(&mut writer, "title", note.title.as_deref().unwrap_or(""))?;

        writer.write_event(Event::Start(BytesStart::new("content")))?;
        if let Some(content) = note.content.as_deref() {
            writer.write_event(Event::CData(BytesCData::new(content)))?;
        }
        writer.write_event(Event::End(BytesEnd::new("content")))?;

        if let Some(created) = note.created {
            write_text_element(&mut writer, "created", &format_timestamp(created))?;
        }
        if let Some(updated) = note.updated {
            write_text_element(&mut writer, "updated", &format_timestamp(updated))?;
        }

        if options.export_tags {
            for tag_local_id in &note.tag_local_ids {
                let Some(tag_name) = tag_names_by_tag_local_id.get(tag_local_id) else {
                    return Err(EnmlError::Enex(
                        "can't export notes to ENEX: one of notes has a tag local id \
                         for which no tag name was found"
                            .into(),
                    ));
                };
                if tag_name.is_empty() {
                    warn!(%tag_local_id, "Skipping tag with empty name in ENEX export");
                    continue;
                }
                write_text_element(&mut writer, "tag", tag_name)?;
            }
        }

        if let Some(attributes) = note.attributes.as_ref() {
            if !attributes.is_empty() {
                writer.write_event(Event::Start(BytesStart::new("note-attributes")))?;

                if let Some(subject_date) = attributes.subject_date {
                    write_text_element(
                        &mut writer,
                        "subject-date",
                        &format_timestamp(subject_date),
                    )?;
                }
                if let Some(latitude) = attributes.latitude {
                    write_text_element(&mut writer, "latitude", &latitude.to_string())?;
                }
                if let Some(longitude) = attributes.longitude {
                    write_text_element(&mut writer, "longitude", &longitude.to_string())?;
                }
                if let Some(altitude) = attributes.altitude {
                    write_text_element(&mut writer, "altitude", &altitude.to_string())?;
                }
                if let Some(author) = attributes.author.as_deref() {
                    write_text_element(&mut writer, "author", author)?;
                }
                if let Some(source) = attributes.source.as_deref() {
                    write_text_element(&mut writer, "source", source)?;
                }
                if let Some(source_url) = attributes.source_url.as_deref() {
                    write_text_element(&mut writer, "source-url", source_url)?;
                }
                if let Some(source_application) = attributes.source_application.as_deref() {
                    write_text_element(&mut writer, "source-application", source_application)?;
                }
                if let Some(reminder_order) = attributes.reminder_order {
                    write_text_element(
                        &mut writer,
                        "reminder-order",
                        &reminder_order.to_string(),
                    )?;
                }
                if let Some(reminder_time) = attributes.reminder_time {
                    write_text_element(
                        &mut writer,
                        "reminder-time",
                        &format_timestamp(reminder_time),
                    )?;
                }
                if let Some(reminder_done_time) = attributes.reminder_done_time {
                    write_text_element(
                        &mut writer,
                        "reminder-done-time",
                        &format_timestamp(reminder_done_time),
                    )?;
                }
                if let Some(place_name) = attributes.place_name.as_deref() {
                    write_text_element(&mut writer, "place-name", place_name)?;
                }
                if let Some(content_class) = attributes.content_class.as_deref() {
                    write_text_element(&mut writer, "content-class", content_class)?;
                }
                if let Some(application_data) = attributes.application_data.as_ref() {
                    write_application_data(&mut writer, application_data)?;
                }

                writer.write_event(Event::End(BytesEnd::new("note-attributes")))?;
            }
        }

        for resource in note.resources.iter().flatten() {
            write_resource(&mut writer, resource)?;
        }

        writer.write_event(Event::End(BytesEnd::new("note")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("en-export")))?;

    let enex = String::from_utf8(writer.into_inner())
        .map_err(|e| EnmlError::MalformedXml(e.to_string()))?;

    validate::validate_enex(&enex).map_err(|e| match e {
        EnmlError::Validation { errors } => EnmlError::Validation { errors },
        other => other,
    })?;

    Ok(enex)
}

fn write_resource(writer: &mut Writer<Vec<u8>>, resource: &Resource) -> Result<(), EnmlError> {
    let Some(body) = resource.data.as_ref().and_then(|data| data.body.as_ref()) else {
        warn!("Skipping ENEX export of a resource without data body");
        return Ok(());
    };
    let Some(mime) = resource.mime.as_deref() else {
        warn!("Skipping ENEX export of a resource without mime type");
        return Ok(());
    };

    if body.len() > ENEX_MAX_RESOURCE_DATA_SIZE {
        return Err(EnmlError::Enex(
            "can't export notes to ENEX: found resource larger than 25 Mb".into(),
        ));
    }

    writer.write_event(Event::Start(BytesStart::new("resource")))?;

    let mut data = BytesStart::new("data");
    data.push_attribute(("encoding", "base64"));
    writer.write_event(Event::Start(data))?;
    writer.write_event(Event::Text(BytesText::new(&BASE64.encode(body))))?;
    writer.write_event(Event::End(BytesEnd::new("data")))?;

    write_text_element(writer, "mime", mime)?;

    if let Some(width) = resource.width {
        write_text_element(writer, "width", &width.to_string())?;
    }
    if let Some(height) = resource.height {
        write_text_element(writer, "height", &height.to_string())?;
    }

    if let Some(recognition_body) = resource
        .recognition
        .as_ref()
        .and_then(|data| data.body.as_ref())
    {
        let recognition = String::from_utf8(recognition_body.clone()).map_err(|_| {
            EnmlError::Enex("resource recognition index is not valid UTF-8".into())
        })?;
        validate::validate_reco_index(&recognition).map_err(|_| {
            EnmlError::Enex(
                "can't export notes to ENEX: found invalid resource recognition index \
                 at one of notes"
                    .into(),
            )
        })?;
        writer.write_event(Event::Start(BytesStart::new("recognition")))?;
        writer.write_event(Event::CData(BytesCData::new(&recognition)))?;
        writer.write_event(Event::End(BytesEnd::new("recognition")))?;
    }

    if let Some(attributes) = resource.attributes.as_ref() {
        if !attributes.is_empty() {
            writer.write_event(Event::Start(BytesStart::new("resource-attributes")))?;

            if let Some(source_url) = attributes.source_url.as_deref() {
                write_text_element(writer, "source-url", source_url)?;
            }
            if let Some(timestamp) = attributes.timestamp {
                write_text_element(writer, "timestamp", &format_timestamp(timestamp))?;
            }
            if let Some(latitude) = attributes.latitude {
                write_text_element(writer, "latitude", &latitude.to_string())?;
            }
            if let Some(longitude) = attributes.longitude {
                write_text_element(writer, "longitude", &longitude.to_string())?;
            }
            if let Some(altitude) = attributes.altitude {
                write_text_element(writer, "altitude", &altitude.to_string())?;
            }
            if let Some(camera_make) = attributes.camera_make.as_deref() {
                write_text_element(writer, "camera-make", camera_make)?;
            }
            if let Some(reco_type) = attributes.reco_type.as_deref() {
                write_text_element(writer, "reco-type", reco_type)?;
            }
            if let Some(file_name) = attributes.file_name.as_deref() {
                write_text_element(writer, "file-name", file_name)?;
            }
            if let Some(attachment) = attributes.attachment {
                write_text_element(
                    writer,
                    "attachment",
                    if attachment { "true" } else { "false" },
                )?;
            }
            if let Some(application_data) = attributes.application_data.as_ref() {
                write_application_data(writer, application_data)?;
            }

            writer.write_event(Event::End(BytesEnd::new("resource-attributes")))?;
        }
    }

    if let Some(alternate_body) = resource
        .alternate_data
        .as_ref()
        .and_then(|data| data.body.as_ref())
    {
        let mut alternate = BytesStart::new("alternate-data");
        alternate.push_attribute(("encoding", "base64"));
        writer.write_event(Event::Start(alternate))?;
        writer.write_event(Event::Text(BytesText::new(&BASE64.encode(alternate_body))))?;
        writer.write_event(Event::End(BytesEnd::new("alternate-data")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("resource")))?;
    Ok(())
}

fn write_text_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    text: &str,
) -> Result<(), EnmlError> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_application_data(
    writer: &mut Writer<Vec<u8>>,
    application_data: &HashMap<String, String>,
) -> Result<(), EnmlError> {
    // Deterministic output order for stable exports
    let mut entries: Vec<(&String, &String)> = application_data.iter().collect();
    entries.sort_unstable();
    for (key, value) in entries {
        let mut element = BytesStart::new("application-data");
        element.push_attribute(("key", key.as_str()));
        writer.write_event(Event::Start(element))?;
        writer.write_event(Event::Text(BytesText::new(value)))?;
        writer.write_event(Event::End(BytesEnd::new("application-data")))?;
    }
    Ok(())
}

// ============================================================================
// Import
// ============================================================================

/// Where the cursor of an import currently sits
#[derive(Debug, Default)]
struct ImportState {
    inside_note: bool,
    inside_note_content: bool,
    inside_note_attributes: bool,
    inside_resource: bool,
    inside_resource_data: bool,
    inside_resource_recognition_data: bool,
    inside_resource_alternate_data: bool,
    inside_resource_attributes: bool,
}

/// Parses an ENEX document into notes and their tag names
pub fn import_enex(enex: &str) -> Result<EnexImportResult, EnmlError> {
    debug!("Importing ENEX");

    if enex.is_empty() {
        return Err(EnmlError::Enex("can't import ENEX: the input is empty".into()));
    }

    let mut reader = Reader::from_str(enex);
    reader.config_mut().expand_empty_elements = true;

    let mut result = EnexImportResult::default();
    let mut state = ImportState::default();

    let mut current_note = Note::new();
    let mut current_note_content = String::new();
    let mut current_resource = Resource::new();
    let mut current_resource_data = String::new();
    let mut current_recognition_data = String::new();
    let mut current_alternate_data = String::new();
    let mut current_application_data_key: Option<String> = None;
    let mut current_text = String::new();

    loop {
        match reader.read_event() {
            Err(e) => return Err(EnmlError::MalformedXml(e.to_string())),
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                current_text.clear();

                match name.as_str() {
                    "en-export" | "export-date" | "application" | "version" => {}
                    "note" => {
                        current_note = Note::new();
                        state.inside_note = true;
                    }
                    "content" => {
                        if !state.inside_note {
                            return Err(EnmlError::Enex(
                                "detected content tag outside of note tag".into(),
                            ));
                        }
                        state.inside_note_content = true;
                        current_note_content.clear();
                    }
                    "note-attributes" => {
                        if !state.inside_note {
                            return Err(EnmlError::Enex(
                                "detected note-attributes tag outside of note".into(),
                            ));
                        }
                        state.inside_note_attributes = true;
                    }
                    "resource" => {
                        if !state.inside_note {
                            return Err(EnmlError::Enex(
                                "detected resource tag outside of note".into(),
                            ));
                        }
                        current_resource = Resource::new();
                        state.inside_resource = true;
                    }
                    "data" => {
                        if !state.inside_resource {
                            return Err(EnmlError::Enex(
                                "detected data tag outside of resource".into(),
                            ));
                        }
                        state.inside_resource_data = true;
                        current_resource_data.clear();
                    }
                    "recognition" => {
                        if !state.inside_resource {
                            return Err(EnmlError::Enex(
                                "detected recognition tag outside of resource".into(),
                            ));
                        }
                        state.inside_resource_recognition_data = true;
                        current_recognition_data.clear();
                    }
                    "alternate-data" => {
                        if !state.inside_resource {
                            return Err(EnmlError::Enex(
                                "detected alternate-data tag outside of resource".into(),
                            ));
                        }
                        state.inside_resource_alternate_data = true;
                        current_alternate_data.clear();
                    }
                    "resource-attributes" => {
                        if !state.inside_resource {
                            return Err(EnmlError::Enex(
                                "detected resource-attributes tag outside of resource".into(),
                            ));
                        }
                        state.inside_resource_attributes = true;
                    }
                    "application-data" => {
                        if !state.inside_note_attributes && !state.inside_resource_attributes {
                            return Err(EnmlError::Enex(
                                "detected application-data tag outside of note or resource \
                                 attributes"
                                    .into(),
                            ));
                        }
                        current_application_data_key = e
                            .attributes()
                            .flatten()
                            .find(|attr| attr.key.as_ref() == b"key")
                            .and_then(|attr| {
                                attr.unescape_value().ok().map(|value| value.into_owned())
                            });
                        if current_application_data_key.is_none() {
                            return Err(EnmlError::Enex(
                                "detected application-data tag without key attribute".into(),
                            ));
                        }
                    }
                    "title" | "tag" => {
                        if !state.inside_note {
                            return Err(EnmlError::Enex(format!(
                                "detected {name} tag outside of note tag"
                            )));
                        }
                    }
                    _ => {
                        // Leaf value elements; checked again at their end
                        // tag when the accumulated text is consumed
                    }
                }
            }
            Ok(Event::Text(t)) => {
                let decoded = t
                    .decode()
                    .map_err(|e| EnmlError::MalformedXml(e.to_string()))?;
                let text = quick_xml::escape::unescape(&decoded)
                    .map_err(|e| EnmlError::MalformedXml(e.to_string()))?;
                if state.inside_resource_data {
                    current_resource_data.push_str(&text);
                } else if state.inside_resource_recognition_data {
                    current_recognition_data.push_str(&text);
                } else if state.inside_resource_alternate_data {
                    current_alternate_data.push_str(&text);
                } else if state.inside_note_content {
                    current_note_content.push_str(&text);
                } else {
                    current_text.push_str(&text);
                }
            }
            Ok(Event::CData(t)) => {
                let text = String::from_utf8_lossy(t.as_ref()).into_owned();
                if state.inside_note_content {
                    current_note_content.push_str(&text);
                } else if state.inside_resource_recognition_data {
                    current_recognition_data.push_str(&text);
                } else {
                    current_text.push_str(&text);
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let text = std::mem::take(&mut current_text);

                match name.as_str() {
                    "note" => {
                        result
                            .notes
                            .push(std::mem::replace(&mut current_note, Note::new()));
                        state.inside_note = false;
                    }
                    "content" => {
                        if !current_note_content.is_empty() {
                            current_note.content = Some(current_note_content.clone());
                        }
                        state.inside_note_content = false;
                    }
                    "title" => {
                        current_note.title = (!text.is_empty()).then_some(text);
                    }
                    "created" => {
                        if !state.inside_note {
                            return Err(EnmlError::Enex(
                                "detected timestamp tag related to note outside of note tag"
                                    .into(),
                            ));
                        }
                        current_note.created = Some(parse_timestamp(&text, "creation timestamp")?);
                    }
                    "updated" => {
                        if !state.inside_note {
                            return Err(EnmlError::Enex(
                                "detected timestamp tag related to note outside of note tag"
                                    .into(),
                            ));
                        }
                        current_note.updated =
                            Some(parse_timestamp(&text, "modification timestamp")?);
                    }
                    "tag" => {
                        let tag_names = result
                            .tag_names_by_note_local_id
                            .entry(current_note.local_id.clone())
                            .or_default();
                        if !tag_names.contains(&text) {
                            tag_names.push(text);
                        }
                    }
                    "note-attributes" => {
                        state.inside_note_attributes = false;
                    }
                    "resource-attributes" => {
                        state.inside_resource_attributes = false;
                    }
                    "latitude" | "longitude" | "altitude" => {
                        let value: f64 = text.trim().parse().map_err(|_| {
                            EnmlError::Enex(format!(
                                "failed to parse attribute of double type: {name}"
                            ))
                        })?;
                        if state.inside_note_attributes {
                            let attributes = current_note.attributes_mut();
                            match name.as_str() {
                                "latitude" => attributes.latitude = Some(value),
                                "longitude" => attributes.longitude = Some(value),
                                _ => attributes.altitude = Some(value),
                            }
                        } else if state.inside_resource_attributes {
                            let attributes = current_resource
                                .attributes
                                .get_or_insert_with(Default::default);
                            match name.as_str() {
                                "latitude" => attributes.latitude = Some(value),
                                "longitude" => attributes.longitude = Some(value),
                                _ => attributes.altitude = Some(value),
                            }
                        } else {
                            return Err(EnmlError::Enex(format!(
                                "detected {name} tag outside of note attributes or resource \
                                 attributes"
                            )));
                        }
                    }
                    "author" | "source" | "source-application" | "place-name"
                    | "content-class" => {
                        if !state.inside_note || !state.inside_note_attributes {
                            return Err(EnmlError::Enex(format!(
                                "detected {name} tag outside of note or note attributes"
                            )));
                        }
                        let attributes = current_note.attributes_mut();
                        match name.as_str() {
                            "author" => attributes.author = Some(text),
                            "source" => attributes.source = Some(text),
                            "source-application" => attributes.source_application = Some(text),
                            "place-name" => attributes.place_name = Some(text),
                            _ => attributes.content_class = Some(text),
                        }
                    }
                    "source-url" => {
                        if state.inside_note_attributes {
                            current_note.attributes_mut().source_url = Some(text);
                        } else if state.inside_resource_attributes {
                            current_resource
                                .attributes
                                .get_or_insert_with(Default::default)
                                .source_url = Some(text);
                        } else {
                            return Err(EnmlError::Enex(
                                "detected source-url tag outside of note attributes or \
                                 resource attributes"
                                    .into(),
                            ));
                        }
                    }
                    "subject-date" | "reminder-time" | "reminder-done-time" => {
                        if !state.inside_note_attributes {
                            return Err(EnmlError::Enex(format!(
                                "detected {name} tag outside of note attributes"
                            )));
                        }
                        let timestamp = parse_timestamp(&text, &name)?;
                        let attributes = current_note.attributes_mut();
                        match name.as_str() {
                            "subject-date" => attributes.subject_date = Some(timestamp),
                            "reminder-time" => attributes.reminder_time = Some(timestamp),
                            _ => attributes.reminder_done_time = Some(timestamp),
                        }
                    }
                    "reminder-order" => {
                        if !state.inside_note_attributes {
                            return Err(EnmlError::Enex(
                                "detected reminder-order tag outside of note attributes".into(),
                            ));
                        }
                        let value: i64 = text.trim().parse().map_err(|_| {
                            EnmlError::Enex("failed to parse reminder order".into())
                        })?;
                        current_note.attributes_mut().reminder_order = Some(value);
                    }
                    "timestamp" => {
                        if !state.inside_resource_attributes {
                            return Err(EnmlError::Enex(
                                "detected timestamp tag outside of resource attributes".into(),
                            ));
                        }
                        current_resource
                            .attributes
                            .get_or_insert_with(Default::default)
                            .timestamp = Some(parse_timestamp(&text, "timestamp")?);
                    }
                    "camera-make" | "reco-type" | "file-name" => {
                        if !state.inside_resource_attributes {
                            return Err(EnmlError::Enex(format!(
                                "detected {name} tag outside of resource attributes"
                            )));
                        }
                        let attributes = current_resource
                            .attributes
                            .get_or_insert_with(Default::default);
                        match name.as_str() {
                            "camera-make" => attributes.camera_make = Some(text),
                            "reco-type" => attributes.reco_type = Some(text),
                            _ => attributes.file_name = Some(text),
                        }
                    }
                    "attachment" => {
                        if !state.inside_resource_attributes {
                            return Err(EnmlError::Enex(
                                "detected attachment tag outside of resource attributes".into(),
                            ));
                        }
                        current_resource
                            .attributes
                            .get_or_insert_with(Default::default)
                            .attachment = Some(text.trim() == "true");
                    }
                    "application-data" => {
                        let Some(key) = current_application_data_key.take() else {
                            continue;
                        };
                        if state.inside_resource_attributes {
                            current_resource
                                .attributes
                                .get_or_insert_with(Default::default)
                                .application_data
                                .get_or_insert_with(HashMap::new)
                                .insert(key, text);
                        } else if state.inside_note_attributes {
                            current_note
                                .attributes_mut()
                                .application_data
                                .get_or_insert_with(HashMap::new)
                                .insert(key, text);
                        }
                    }
                    "mime" => {
                        if !state.inside_resource {
                            return Err(EnmlError::Enex(
                                "detected mime tag outside of resource".into(),
                            ));
                        }
                        current_resource.mime = Some(text);
                    }
                    "width" => {
                        if !state.inside_resource {
                            return Err(EnmlError::Enex(
                                "detected width tag outside of resource".into(),
                            ));
                        }
                        current_resource.width = Some(text.trim().parse().map_err(|_| {
                            EnmlError::Enex("failed to parse resource width from string".into())
                        })?);
                    }
                    "height" => {
                        if !state.inside_resource {
                            return Err(EnmlError::Enex(
                                "detected height tag outside of resource".into(),
                            ));
                        }
                        current_resource.height = Some(text.trim().parse().map_err(|_| {
                            EnmlError::Enex("failed to parse resource height from string".into())
                        })?);
                    }
                    "data" => {
                        let decoded = decode_base64(&current_resource_data)?;
                        current_resource.data = Some(Data::from_body(decoded));
                        state.inside_resource_data = false;
                    }
                    "recognition" => {
                        current_resource.recognition = Some(Data::from_body(
                            current_recognition_data.clone().into_bytes(),
                        ));
                        state.inside_resource_recognition_data = false;
                    }
                    "alternate-data" => {
                        let decoded = decode_base64(&current_alternate_data)?;
                        current_resource.alternate_data = Some(Data::from_body(decoded));
                        state.inside_resource_alternate_data = false;
                    }
                    "resource" => {
                        finalize_resource(&mut current_note, &mut current_resource)?;
                        state.inside_resource = false;
                    }
                    _ => {}
                }
            }
            Ok(_) => {}
        }
    }

    debug!(note_count = result.notes.len(), "ENEX import finished");
    Ok(result)
}

fn decode_base64(encoded: &str) -> Result<Vec<u8>, EnmlError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64
        .decode(compact.as_bytes())
        .map_err(|e| EnmlError::Enex(format!("failed to decode base64 data: {e}")))
}

fn finalize_resource(note: &mut Note, resource: &mut Resource) -> Result<(), EnmlError> {
    let finished = std::mem::replace(resource, Resource::new());

    let has_body = finished
        .data
        .as_ref()
        .map_or(false, |data| data.body.is_some());
    if !has_body {
        return Err(EnmlError::Enex("parsed resource without a data body".into()));
    }

    if finished.mime.is_none() {
        return Err(EnmlError::Enex("parsed resource without a mime type".into()));
    }

    let mut finished = finished;
    finished.note_local_id = Some(note.local_id.clone());
    note.resources.get_or_insert_with(Vec::new).push(finished);
    Ok(())
}
