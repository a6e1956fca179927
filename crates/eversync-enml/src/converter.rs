//! Streaming HTML <-> ENML conversion
//!
//! Both directions are single-pass transforms over an XML event stream.
//! Each open element gets an explicit disposition pushed onto a stack when
//! its start is seen and popped at its end, so start/end pairing stays
//! correct even when elements are renamed, dropped or skipped:
//!
//! - `Written` - the (possibly renamed) element was emitted and its end
//!   tag will be too
//! - `DroppedTag` - the tag itself was dropped but its contents stream
//!   through
//! - `SkippedSubtree` - the element and everything inside it is dropped
//!
//! Text nodes are written only while inside the written root and outside
//! any skipped subtree, `en-media` or `en-crypt` element.

use std::sync::Arc;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::{debug, warn};

use eversync_core::ports::{IDecryptedTextCache, IHtmlCleaner};

use crate::error::EnmlError;
use crate::skip_rules::{skip_element_option, SkipElementOption, SkipHtmlElementRule};
use crate::tags;
use crate::validate::{self, DtdSchema};

const ENML_DOCTYPE: &str =
    "en-note SYSTEM \"http://xml.evernote.com/pub/enml2.dtd\"";

const CHECKBOX_CHECKED_SRC: &str = "qrc:/checkbox_icons/checkbox_yes.png";
const CHECKBOX_UNCHECKED_SRC: &str = "qrc:/checkbox_icons/checkbox_no.png";

const GENERIC_RESOURCE_OBJECT_TYPE: &str = "application/vnd.eversync.resource";
const ENCRYPT_OBJECT_TYPE: &str = "application/vnd.eversync.encrypt";

/// Node counters filled during ENML -> HTML conversion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoteContentToHtmlExtraData {
    pub num_en_todo_nodes: u64,
    pub num_hyperlink_nodes: u64,
    pub num_en_crypt_nodes: u64,
    pub num_en_decrypted_nodes: u64,
}

/// What happened to an open element; popped at its end tag
enum ElementDisposition {
    Written {
        name: String,
        /// The start was emitted as a self-closed element; the end event
        /// is swallowed
        empty_element: bool,
        suppresses_text: bool,
    },
    DroppedTag,
    SkippedSubtree,
}

/// Shared stack bookkeeping for both conversion directions
#[derive(Default)]
struct ConversionState {
    stack: Vec<ElementDisposition>,
    written_depth: usize,
    skipped_subtree_depth: usize,
    text_suppression_depth: usize,
}

impl ConversionState {
    fn push(&mut self, disposition: ElementDisposition) {
        match &disposition {
            ElementDisposition::Written {
                suppresses_text, ..
            } => {
                self.written_depth += 1;
                if *suppresses_text {
                    self.text_suppression_depth += 1;
                }
            }
            ElementDisposition::SkippedSubtree => self.skipped_subtree_depth += 1,
            ElementDisposition::DroppedTag => {}
        }
        self.stack.push(disposition);
    }

    /// Pops the disposition of the element whose end tag was just seen;
    /// returns the end tag to write, if any
    fn pop(&mut self) -> Option<String> {
        match self.stack.pop()? {
            ElementDisposition::Written {
                name,
                empty_element,
                suppresses_text,
            } => {
                self.written_depth -= 1;
                if suppresses_text {
                    self.text_suppression_depth -= 1;
                }
                (!empty_element).then_some(name)
            }
            ElementDisposition::SkippedSubtree => {
                self.skipped_subtree_depth -= 1;
                None
            }
            ElementDisposition::DroppedTag => None,
        }
    }

    fn inside_skipped_subtree(&self) -> bool {
        self.skipped_subtree_depth > 0
    }

    fn text_writable(&self) -> bool {
        self.written_depth > 0
            && self.skipped_subtree_depth == 0
            && self.text_suppression_depth == 0
    }
}

/// The ENML converter
///
/// Holds the HTML cleaner collaborator; all other inputs are per call.
pub struct Converter {
    html_cleaner: Arc<dyn IHtmlCleaner>,
}

impl Converter {
    pub fn new(html_cleaner: Arc<dyn IHtmlCleaner>) -> Self {
        Self { html_cleaner }
    }

    /// Converts editor HTML into a valid ENML document
    ///
    /// The HTML is first run through the cleaner to obtain well-formed
    /// XML, then streamed with the tag/attribute rules applied, and
    /// finally validated (with one attribute-stripping fixup pass).
    pub fn html_to_note_content(
        &self,
        html: &str,
        skip_rules: &[SkipHtmlElementRule],
        decrypted_text_cache: &dyn IDecryptedTextCache,
    ) -> Result<String, EnmlError> {
        let xml = self
            .html_cleaner
            .html_to_xml(html)
            .map_err(|e| EnmlError::HtmlCleanup(format!("{e:#}")))?;

        let mut reader = Reader::from_str(&xml);
        reader.config_mut().expand_empty_elements = true;

        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::DocType(BytesText::from_escaped(ENML_DOCTYPE)))?;

        let mut state = ConversionState::default();

        loop {
            match reader.read_event() {
                Err(e) => return Err(EnmlError::MalformedXml(e.to_string())),
                Ok(Event::Eof) => break,
                Ok(Event::Start(e)) => {
                    self.process_html_start_element(
                        &e,
                        &mut reader,
                        &mut writer,
                        &mut state,
                        skip_rules,
                        decrypted_text_cache,
                    )?;
                }
                Ok(Event::Text(t)) => {
                    if state.text_writable() {
                        writer.write_event(Event::Text(t))?;
                    }
                }
                Ok(Event::CData(t)) => {
                    if state.text_writable() {
                        writer.write_event(Event::CData(t))?;
                    }
                }
                Ok(Event::End(_)) => {
                    if let Some(name) = state.pop() {
                        writer.write_event(Event::End(BytesEnd::new(name)))?;
                    }
                }
                // Declarations, doctypes, comments and processing
                // instructions of the source never reach the output
                Ok(_) => {}
            }
        }

        let enml = String::from_utf8(writer.into_inner())
            .map_err(|e| EnmlError::MalformedXml(e.to_string()))?;

        validate::validate_and_fixup_enml(&enml, &DtdSchema::enml())
    }

    fn process_html_start_element(
        &self,
        element: &BytesStart<'_>,
        reader: &mut Reader<&[u8]>,
        writer: &mut Writer<Vec<u8>>,
        state: &mut ConversionState,
        skip_rules: &[SkipHtmlElementRule],
        decrypted_text_cache: &dyn IDecryptedTextCache,
    ) -> Result<(), EnmlError> {
        if state.inside_skipped_subtree() {
            state.push(ElementDisposition::SkippedSubtree);
            return Ok(());
        }

        let mut name = element_name(element);

        // The html wrapper is dropped while its contents stream through;
        // form and title disappear with everything inside them
        if name == "html" {
            state.push(ElementDisposition::DroppedTag);
            return Ok(());
        }
        if name == "form" || name == "title" {
            state.push(ElementDisposition::SkippedSubtree);
            return Ok(());
        }

        if name == "body" {
            name = "en-note".to_string();
        }

        if tags::is_forbidden_xhtml_tag(&name) && name != "object" {
            debug!(%name, "Skipping forbidden XHTML tag with its contents");
            state.push(ElementDisposition::SkippedSubtree);
            return Ok(());
        }

        if name != "en-note"
            && !tags::is_allowed_xhtml_tag(&name)
            && !tags::is_evernote_specific_xhtml_tag(&name)
            && name != "object"
        {
            debug!(%name, "Tag is neither allowed nor Evernote-specific, dropping the tag");
            state.push(ElementDisposition::DroppedTag);
            return Ok(());
        }

        let mut attributes = collect_attributes(element)?;

        match skip_element_option(&name, &attributes, skip_rules) {
            SkipElementOption::SkipWithContents => {
                state.push(ElementDisposition::SkippedSubtree);
                return Ok(());
            }
            SkipElementOption::SkipButPreserveContents => {
                state.push(ElementDisposition::DroppedTag);
                return Ok(());
            }
            SkipElementOption::DontSkip => {}
        }

        // Elements the editor marked with en-tag carry Evernote semantics
        if matches!(name.as_str(), "img" | "object" | "div") {
            if let Some(en_tag) = attribute_value(&attributes, "en-tag") {
                match en_tag.as_str() {
                    "en-decrypted" => {
                        // The subtree is consumed here: the decrypted text
                        // is re-read, re-encrypted if modified, and written
                        // back as en-crypt
                        return decrypted_div_to_en_crypt(
                            &attributes,
                            reader,
                            writer,
                            decrypted_text_cache,
                        );
                    }
                    "en-todo" => {
                        let Some(src) = attribute_value(&attributes, "src") else {
                            warn!("Found en-todo tag without src attribute");
                            state.push(ElementDisposition::DroppedTag);
                            return Ok(());
                        };

                        let mut todo = BytesStart::new("en-todo");
                        if src.contains("checkbox_yes.png") {
                            todo.push_attribute(("checked", "true"));
                        } else if !src.contains("checkbox_no.png") {
                            state.push(ElementDisposition::DroppedTag);
                            return Ok(());
                        }
                        writer.write_event(Event::Start(todo))?;
                        state.push(ElementDisposition::Written {
                            name: "en-todo".to_string(),
                            empty_element: false,
                            suppresses_text: false,
                        });
                        return Ok(());
                    }
                    "en-crypt" => {
                        let Some(encrypted_text) = attribute_value(&attributes, "encrypted_text")
                        else {
                            return Err(EnmlError::InvalidStructure(
                                "found en-crypt tag without encrypted_text attribute".into(),
                            ));
                        };

                        let mut en_crypt = BytesStart::new("en-crypt");
                        for key in ["cipher", "length", "hint"] {
                            if let Some(value) = attribute_value(&attributes, key) {
                                en_crypt.push_attribute((key, value.as_str()));
                            }
                        }
                        writer.write_event(Event::Start(en_crypt))?;
                        writer.write_event(Event::Text(BytesText::new(&encrypted_text)))?;
                        state.push(ElementDisposition::Written {
                            name: "en-crypt".to_string(),
                            empty_element: false,
                            suppresses_text: true,
                        });
                        return Ok(());
                    }
                    "en-media" => {
                        let is_image = name == "img";
                        let mut en_media = BytesStart::new("en-media");
                        for (key, value) in &attributes {
                            if !is_image && key == "resource-mime-type" {
                                en_media.push_attribute(("type", value.as_str()));
                            } else if tags::is_allowed_en_media_attribute(key)
                                && (is_image || key != "type")
                            {
                                en_media.push_attribute((key.as_str(), value.as_str()));
                            }
                        }
                        writer.write_event(Event::Start(en_media))?;
                        state.push(ElementDisposition::Written {
                            name: "en-media".to_string(),
                            empty_element: false,
                            suppresses_text: true,
                        });
                        return Ok(());
                    }
                    _ => {}
                }
            }
        }

        if name == "object" {
            // An object without Evernote semantics is still forbidden
            state.push(ElementDisposition::SkippedSubtree);
            return Ok(());
        }

        attributes.retain(|(key, _)| {
            if tags::is_forbidden_xhtml_attribute(key) {
                return false;
            }
            // The hyperlink numbering added during ENML -> HTML is an
            // editor-side artifact
            if name == "a" && key == "en-hyperlink-id" {
                return false;
            }
            true
        });

        let mut start = BytesStart::new(name.clone());
        for (key, value) in &attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }
        writer.write_event(Event::Start(start))?;
        state.push(ElementDisposition::Written {
            name,
            empty_element: false,
            suppresses_text: false,
        });

        Ok(())
    }

    /// Converts an ENML document into HTML for local display/editing
    pub fn note_content_to_html(
        &self,
        note_content: &str,
        decrypted_text_cache: &dyn IDecryptedTextCache,
    ) -> Result<(String, NoteContentToHtmlExtraData), EnmlError> {
        let mut reader = Reader::from_str(note_content);
        reader.config_mut().expand_empty_elements = true;

        let mut writer = Writer::new(Vec::new());
        let mut state = ConversionState::default();
        let mut extra_data = NoteContentToHtmlExtraData::default();

        // Attributes of the en-crypt element currently open, with its
        // accumulated ciphertext
        let mut open_en_crypt: Option<(Vec<(String, String)>, String)> = None;

        loop {
            match reader.read_event() {
                Err(e) => return Err(EnmlError::MalformedXml(e.to_string())),
                Ok(Event::Eof) => break,
                Ok(Event::Start(e)) => {
                    let name = element_name(&e);
                    let attributes = collect_attributes(&e)?;

                    match name.as_str() {
                        "en-note" => {
                            let mut body = BytesStart::new("body");
                            for (key, value) in &attributes {
                                body.push_attribute((key.as_str(), value.as_str()));
                            }
                            writer.write_event(Event::Start(body))?;
                            state.push(ElementDisposition::Written {
                                name: "body".to_string(),
                                empty_element: false,
                                suppresses_text: false,
                            });
                        }
                        "en-media" => {
                            let written_name =
                                resource_info_to_html(&attributes, &mut writer)?;
                            state.push(ElementDisposition::Written {
                                name: written_name,
                                empty_element: false,
                                suppresses_text: true,
                            });
                        }
                        "en-crypt" => {
                            open_en_crypt = Some((attributes, String::new()));
                            state.push(ElementDisposition::DroppedTag);
                        }
                        "en-todo" => {
                            extra_data.num_en_todo_nodes += 1;
                            let checked = attribute_value(&attributes, "checked")
                                .map_or(false, |value| value == "true");
                            write_todo_checkbox_html(
                                &mut writer,
                                checked,
                                extra_data.num_en_todo_nodes,
                            )?;
                            state.push(ElementDisposition::Written {
                                name: "img".to_string(),
                                empty_element: false,
                                suppresses_text: false,
                            });
                        }
                        "a" => {
                            extra_data.num_hyperlink_nodes += 1;
                            let mut start = BytesStart::new("a");
                            for (key, value) in &attributes {
                                start.push_attribute((key.as_str(), value.as_str()));
                            }
                            start.push_attribute((
                                "en-hyperlink-id",
                                extra_data.num_hyperlink_nodes.to_string().as_str(),
                            ));
                            writer.write_event(Event::Start(start))?;
                            state.push(ElementDisposition::Written {
                                name: "a".to_string(),
                                empty_element: false,
                                suppresses_text: false,
                            });
                        }
                        "br" => {
                            // br stays self-closing; everything else gets
                            // an explicit end tag so renderers don't
                            // misread empty elements
                            writer.write_event(Event::Empty(BytesStart::new("br")))?;
                            state.push(ElementDisposition::Written {
                                name: "br".to_string(),
                                empty_element: true,
                                suppresses_text: false,
                            });
                        }
                        _ => {
                            let mut start = BytesStart::new(name.clone());
                            for (key, value) in &attributes {
                                start.push_attribute((key.as_str(), value.as_str()));
                            }
                            writer.write_event(Event::Start(start))?;
                            state.push(ElementDisposition::Written {
                                name,
                                empty_element: false,
                                suppresses_text: false,
                            });
                        }
                    }
                }
                Ok(Event::Text(t)) => {
                    if let Some((_, ciphertext)) = open_en_crypt.as_mut() {
                        ciphertext.push_str(
                            &quick_xml::escape::unescape(
                                &t.decode()
                                    .map_err(|e| EnmlError::MalformedXml(e.to_string()))?,
                            )
                            .map_err(|e| EnmlError::MalformedXml(e.to_string()))?,
                        );
                    } else if state.text_writable() {
                        writer.write_event(Event::Text(t))?;
                    }
                }
                Ok(Event::CData(t)) => {
                    if state.text_writable() {
                        writer.write_event(Event::CData(t))?;
                    }
                }
                Ok(Event::End(e)) => {
                    if element_name_from_end(&e) == "en-crypt" {
                        if let Some((attributes, ciphertext)) = open_en_crypt.take() {
                            encrypted_text_to_html(
                                &attributes,
                                &ciphertext,
                                &mut writer,
                                decrypted_text_cache,
                                &mut extra_data,
                            )?;
                        }
                        state.pop();
                        continue;
                    }

                    if let Some(name) = state.pop() {
                        writer.write_event(Event::End(BytesEnd::new(name)))?;
                    }
                }
                Ok(_) => {}
            }
        }

        let html = String::from_utf8(writer.into_inner())
            .map_err(|e| EnmlError::MalformedXml(e.to_string()))?;

        Ok((html, extra_data))
    }
}

// ============================================================================
// Helpers shared by both directions
// ============================================================================

fn element_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.name().as_ref()).into_owned()
}

fn element_name_from_end(element: &BytesEnd<'_>) -> String {
    String::from_utf8_lossy(element.name().as_ref()).into_owned()
}

fn collect_attributes(element: &BytesStart<'_>) -> Result<Vec<(String, String)>, EnmlError> {
    let mut attributes = Vec::new();
    for attribute in element.attributes() {
        let attribute = attribute.map_err(|e| EnmlError::MalformedXml(e.to_string()))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|e| EnmlError::MalformedXml(e.to_string()))?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(attributes)
}

fn attribute_value(attributes: &[(String, String)], name: &str) -> Option<String> {
    attributes
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.clone())
}

// ============================================================================
// HTML -> ENML specifics
// ============================================================================

/// Transcodes a `div[en-tag="en-decrypted"]` subtree back into `en-crypt`
///
/// The decrypted text is re-serialized from the div's contents; if the
/// user edited it, the cache re-encrypts and supplies fresh ciphertext.
fn decrypted_div_to_en_crypt(
    attributes: &[(String, String)],
    reader: &mut Reader<&[u8]>,
    writer: &mut Writer<Vec<u8>>,
    decrypted_text_cache: &dyn IDecryptedTextCache,
) -> Result<(), EnmlError> {
    let Some(mut encrypted_text) = attribute_value(attributes, "encrypted_text") else {
        return Err(EnmlError::InvalidStructure(
            "missing encrypted text attribute within en-decrypted div tag".into(),
        ));
    };

    let Some(entry) = decrypted_text_cache.find_decrypted_text(&encrypted_text) else {
        return Err(EnmlError::DecryptedText(
            "can't find the decrypted text by its encrypted text".into(),
        ));
    };

    // Re-serialize the div's contents to compare against the cached
    // decrypted text
    let mut nested_writer = Writer::new(Vec::new());
    let mut depth = 0usize;
    loop {
        match reader.read_event() {
            Err(e) => return Err(EnmlError::MalformedXml(e.to_string())),
            Ok(Event::Eof) => {
                return Err(EnmlError::MalformedXml(
                    "unexpected end of document inside en-decrypted div".into(),
                ))
            }
            Ok(Event::Start(e)) => {
                depth += 1;
                nested_writer.write_event(Event::Start(e.into_owned()))?;
            }
            Ok(Event::Text(t)) => {
                nested_writer.write_event(Event::Text(t.into_owned()))?;
            }
            Ok(Event::CData(t)) => {
                nested_writer.write_event(Event::CData(t.into_owned()))?;
            }
            Ok(Event::End(e)) => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
                nested_writer.write_event(Event::End(e.into_owned()))?;
            }
            Ok(_) => {}
        }
    }

    let actual_decrypted_text = String::from_utf8(nested_writer.into_inner())
        .map_err(|e| EnmlError::MalformedXml(e.to_string()))?;

    if actual_decrypted_text != entry.decrypted_text {
        debug!("Found modified decrypted text, re-encrypting");
        if let Some(new_encrypted_text) =
            decrypted_text_cache.modify_decrypted_text(&encrypted_text, &actual_decrypted_text)
        {
            encrypted_text = new_encrypted_text;
        }
    }

    let mut en_crypt = BytesStart::new("en-crypt");
    for key in ["cipher", "length", "hint"] {
        if let Some(value) = attribute_value(attributes, key) {
            en_crypt.push_attribute((key, value.as_str()));
        }
    }
    writer.write_event(Event::Start(en_crypt))?;
    writer.write_event(Event::Text(BytesText::new(&encrypted_text)))?;
    writer.write_event(Event::End(BytesEnd::new("en-crypt")))?;

    Ok(())
}

// ============================================================================
// ENML -> HTML specifics
// ============================================================================

/// Writes the HTML element corresponding to an `en-media` tag; returns
/// the name of the element written
fn resource_info_to_html(
    attributes: &[(String, String)],
    writer: &mut Writer<Vec<u8>>,
) -> Result<String, EnmlError> {
    if attribute_value(attributes, "hash").is_none() {
        return Err(EnmlError::InvalidStructure(
            "detected incorrect en-media tag missing hash attribute".into(),
        ));
    }
    let Some(mime_type) = attribute_value(attributes, "type") else {
        return Err(EnmlError::InvalidStructure(
            "detected incorrect en-media tag missing type attribute".into(),
        ));
    };

    let inline_image = mime_type.to_ascii_lowercase().starts_with("image");

    if inline_image {
        // The src attribute is left for the caller: only it knows whether
        // the resource has been materialized in a local file yet
        let mut img = BytesStart::new("img");
        img.push_attribute(("en-tag", "en-media"));
        for (key, value) in attributes {
            img.push_attribute((key.as_str(), value.as_str()));
        }
        img.push_attribute(("class", "en-media-image"));
        writer.write_event(Event::Start(img))?;
        Ok("img".to_string())
    } else {
        let mut object = BytesStart::new("object");
        object.push_attribute(("en-tag", "en-media"));
        object.push_attribute(("class", "en-media-generic hvr-border-color"));
        object.push_attribute(("type", GENERIC_RESOURCE_OBJECT_TYPE));
        for (key, value) in attributes {
            if key == "en-tag" {
                continue;
            }
            if key == "type" {
                object.push_attribute(("resource-mime-type", value.as_str()));
            } else {
                object.push_attribute((key.as_str(), value.as_str()));
            }
        }
        writer.write_event(Event::Start(object))?;
        Ok("object".to_string())
    }
}

fn write_todo_checkbox_html(
    writer: &mut Writer<Vec<u8>>,
    checked: bool,
    todo_index: u64,
) -> Result<(), EnmlError> {
    let mut img = BytesStart::new("img");
    img.push_attribute((
        "src",
        if checked {
            CHECKBOX_CHECKED_SRC
        } else {
            CHECKBOX_UNCHECKED_SRC
        },
    ));
    img.push_attribute((
        "class",
        if checked {
            "checkbox_checked"
        } else {
            "checkbox_unchecked"
        },
    ));
    img.push_attribute(("en-tag", "en-todo"));
    img.push_attribute(("en-todo-id", todo_index.to_string().as_str()));
    writer.write_event(Event::Start(img))?;
    Ok(())
}

/// Writes the HTML form of an `en-crypt` element
///
/// When the cache already holds the decrypted text the block is rendered
/// as an editable `div[en-tag="en-decrypted"]`, otherwise as an opaque
/// object carrying the ciphertext.
fn encrypted_text_to_html(
    attributes: &[(String, String)],
    encrypted_text: &str,
    writer: &mut Writer<Vec<u8>>,
    decrypted_text_cache: &dyn IDecryptedTextCache,
    extra_data: &mut NoteContentToHtmlExtraData,
) -> Result<(), EnmlError> {
    let cipher = attribute_value(attributes, "cipher");
    let length = attribute_value(attributes, "length");
    let hint = attribute_value(attributes, "hint");

    if let Some(entry) = decrypted_text_cache.find_decrypted_text(encrypted_text) {
        extra_data.num_en_decrypted_nodes += 1;

        let mut div = BytesStart::new("div");
        div.push_attribute(("en-tag", "en-decrypted"));
        div.push_attribute(("encrypted_text", encrypted_text));
        div.push_attribute((
            "en-decrypted-id",
            extra_data.num_en_decrypted_nodes.to_string().as_str(),
        ));
        div.push_attribute(("class", "en-decrypted hvr-border-color"));
        if let Some(cipher) = cipher.as_deref() {
            div.push_attribute(("cipher", cipher));
        }
        if let Some(length) = length.as_deref() {
            div.push_attribute(("length", length));
        }
        if let Some(hint) = hint.as_deref() {
            div.push_attribute(("hint", hint));
        }
        writer.write_event(Event::Start(div))?;
        write_decrypted_text_contents(&entry.decrypted_text, writer)?;
        writer.write_event(Event::End(BytesEnd::new("div")))?;
        return Ok(());
    }

    extra_data.num_en_crypt_nodes += 1;

    let mut object = BytesStart::new("object");
    object.push_attribute(("type", ENCRYPT_OBJECT_TYPE));
    object.push_attribute(("en-tag", "en-crypt"));
    object.push_attribute(("class", "en-crypt hvr-border-color"));
    if let Some(hint) = hint.as_deref() {
        object.push_attribute(("hint", hint));
    }
    if let Some(cipher) = cipher.as_deref() {
        object.push_attribute(("cipher", cipher));
    }
    if let Some(length) = length.as_deref() {
        object.push_attribute(("length", length));
    }
    object.push_attribute(("encrypted_text", encrypted_text));
    object.push_attribute((
        "en-crypt-id",
        extra_data.num_en_crypt_nodes.to_string().as_str(),
    ));
    writer.write_event(Event::Start(object))?;
    writer.write_event(Event::End(BytesEnd::new("object")))?;

    Ok(())
}

/// Writes cached decrypted text, preserving its markup when it parses as
/// an XML fragment and falling back to plain characters otherwise
fn write_decrypted_text_contents(
    decrypted_text: &str,
    writer: &mut Writer<Vec<u8>>,
) -> Result<(), EnmlError> {
    let wrapped = format!("<div>{decrypted_text}</div>");
    let mut fragment_reader = Reader::from_str(&wrapped);
    fragment_reader.config_mut().expand_empty_elements = true;

    let mut events = Vec::new();
    let mut depth = 0usize;
    let mut well_formed = true;

    loop {
        match fragment_reader.read_event() {
            Err(_) => {
                well_formed = false;
                break;
            }
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                if depth > 0 {
                    events.push(Event::Start(e.into_owned()));
                }
                depth += 1;
            }
            Ok(Event::End(e)) => {
                depth -= 1;
                if depth > 0 {
                    events.push(Event::End(e.into_owned()));
                }
            }
            Ok(Event::Text(t)) => events.push(Event::Text(t.into_owned())),
            Ok(Event::CData(t)) => events.push(Event::CData(t.into_owned())),
            Ok(_) => {}
        }
    }

    if well_formed {
        for event in events {
            writer.write_event(event)?;
        }
    } else {
        writer.write_event(Event::Text(BytesText::new(decrypted_text)))?;
    }

    Ok(())
}
