//! Schema validation for ENML, ENEX and recognition-index documents
//!
//! Validation runs the document through a streaming check against a
//! [`DtdSchema`]: the root element must match, every element must be
//! declared, every attribute must be declared for its element and
//! required attributes must be present. The schema values below are
//! derived from `enml2.dtd`, `evernote-export3.dtd` and `recoIndex.dtd`.
//!
//! [`validate_and_fixup_enml`] is the recovery path for documents that
//! carry attributes the service doesn't accept: undeclared attributes are
//! stripped in one re-streaming pass driven by the schema's per-element
//! allowlists, then the document is validated again. Callers with a
//! custom DTD supply their own [`DtdSchema`] value.

use std::collections::{HashMap, HashSet};

use quick_xml::events::{BytesDecl, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::debug;

use crate::error::EnmlError;

/// Per-element declaration: which attributes may and must appear
#[derive(Debug, Clone, Default)]
pub struct ElementDecl {
    pub allowed_attributes: HashSet<String>,
    pub required_attributes: HashSet<String>,
}

/// A distilled document type definition
///
/// Carries exactly what the validator and the fixup pass consult: the
/// root element name and per-element attribute declarations.
#[derive(Debug, Clone)]
pub struct DtdSchema {
    pub root_element: String,
    pub elements: HashMap<String, ElementDecl>,
}

impl DtdSchema {
    pub fn new(root_element: impl Into<String>) -> Self {
        Self {
            root_element: root_element.into(),
            elements: HashMap::new(),
        }
    }

    pub fn element(
        mut self,
        name: &str,
        allowed_attributes: &[&str],
        required_attributes: &[&str],
    ) -> Self {
        let mut allowed: HashSet<String> =
            allowed_attributes.iter().map(|s| s.to_string()).collect();
        for required in required_attributes {
            allowed.insert(required.to_string());
        }
        self.elements.insert(
            name.to_string(),
            ElementDecl {
                allowed_attributes: allowed,
                required_attributes: required_attributes.iter().map(|s| s.to_string()).collect(),
            },
        );
        self
    }

    /// The schema of `enml2.dtd`
    pub fn enml() -> Self {
        // Attributes the DTD allows on every element
        const COMMON: &[&str] = &["style", "title", "lang", "xml:lang", "dir"];

        fn with_common<'a>(extra: &[&'a str]) -> Vec<&'a str> {
            let mut all = COMMON.to_vec();
            all.extend_from_slice(extra);
            all
        }

        let mut schema = Self::new("en-note")
            .element(
                "en-note",
                &with_common(&["bgcolor", "text", "xml:space"]),
                &[],
            )
            .element(
                "en-media",
                &with_common(&[
                    "hash", "type", "align", "alt", "longdesc", "height", "width", "border",
                    "hspace", "vspace", "usemap",
                ]),
                &["hash", "type"],
            )
            .element("en-crypt", &["hint", "cipher", "length"], &[])
            .element("en-todo", &["checked"], &[])
            .element(
                "a",
                &with_common(&[
                    "charset", "type", "name", "href", "hreflang", "rel", "rev", "shape",
                    "coords", "target", "accesskey", "tabindex",
                ]),
                &[],
            )
            .element(
                "img",
                &with_common(&[
                    "src", "alt", "longdesc", "height", "width", "border", "hspace", "vspace",
                    "usemap", "ismap", "align",
                ]),
                &[],
            )
            .element(
                "table",
                &with_common(&[
                    "summary", "width", "border", "cellspacing", "cellpadding", "align",
                    "bgcolor",
                ]),
                &[],
            )
            .element(
                "td",
                &with_common(&[
                    "abbr", "rowspan", "colspan", "align", "char", "charoff", "valign",
                    "bgcolor", "width", "height", "nowrap",
                ]),
                &[],
            )
            .element(
                "th",
                &with_common(&[
                    "abbr", "rowspan", "colspan", "align", "char", "charoff", "valign",
                    "bgcolor", "width", "height", "nowrap",
                ]),
                &[],
            )
            .element(
                "tr",
                &with_common(&["align", "char", "charoff", "valign", "bgcolor"]),
                &[],
            )
            .element(
                "col",
                &with_common(&["span", "width", "align", "char", "charoff", "valign"]),
                &[],
            )
            .element(
                "colgroup",
                &with_common(&["span", "width", "align", "char", "charoff", "valign"]),
                &[],
            )
            .element("ol", &with_common(&["type", "start", "compact"]), &[])
            .element("ul", &with_common(&["type", "compact"]), &[])
            .element("li", &with_common(&["type", "value"]), &[])
            .element(
                "font",
                &with_common(&["size", "color", "face"]),
                &[],
            )
            .element(
                "hr",
                &with_common(&["align", "noshade", "size", "width"]),
                &[],
            )
            .element("pre", &with_common(&["width", "xml:space"]), &[])
            .element("br", &with_common(&["clear"]), &[])
            .element("bdo", &with_common(&[]), &[])
            .element("caption", &with_common(&["align"]), &[])
            .element("area", &with_common(&["shape", "coords", "href", "nohref", "alt"]), &[])
            .element("map", &with_common(&["name"]), &[])
            .element("q", &with_common(&["cite"]), &[])
            .element("blockquote", &with_common(&["cite"]), &[])
            .element("ins", &with_common(&["cite", "datetime"]), &[])
            .element("del", &with_common(&["cite", "datetime"]), &[]);

        // The remaining allowed tags carry only the common attribute set,
        // plus align on the block-level ones
        for name in [
            "abbr", "acronym", "address", "b", "big", "center", "cite", "code", "dd", "dfn",
            "div", "dl", "dt", "em", "h1", "h2", "h3", "h4", "h5", "h6", "i", "kbd", "p", "s",
            "samp", "small", "span", "strike", "strong", "sub", "sup", "tbody", "tfoot",
            "thead", "tt", "u", "var", "xmp",
        ] {
            schema = schema.element(name, &with_common(&["align"]), &[]);
        }

        schema
    }

    /// The schema of `evernote-export3.dtd`
    pub fn enex() -> Self {
        Self::new("en-export")
            .element(
                "en-export",
                &["export-date", "application", "version"],
                &[],
            )
            .element("note", &[], &[])
            .element("title", &[], &[])
            .element("content", &[], &[])
            .element("created", &[], &[])
            .element("updated", &[], &[])
            .element("tag", &[], &[])
            .element("note-attributes", &[], &[])
            .element("latitude", &[], &[])
            .element("longitude", &[], &[])
            .element("altitude", &[], &[])
            .element("author", &[], &[])
            .element("source", &[], &[])
            .element("source-url", &[], &[])
            .element("source-application", &[], &[])
            .element("reminder-order", &[], &[])
            .element("reminder-time", &[], &[])
            .element("reminder-done-time", &[], &[])
            .element("place-name", &[], &[])
            .element("content-class", &[], &[])
            .element("subject-date", &[], &[])
            .element("application-data", &["key"], &["key"])
            .element("resource", &[], &[])
            .element("data", &["encoding"], &[])
            .element("mime", &[], &[])
            .element("width", &[], &[])
            .element("height", &[], &[])
            .element("duration", &[], &[])
            .element("recognition", &[], &[])
            .element("alternate-data", &["encoding"], &[])
            .element("resource-attributes", &[], &[])
            .element("timestamp", &[], &[])
            .element("camera-make", &[], &[])
            .element("camera-model", &[], &[])
            .element("reco-type", &[], &[])
            .element("file-name", &[], &[])
            .element("attachment", &[], &[])
    }

    /// The schema of `recoIndex.dtd`
    pub fn reco_index() -> Self {
        Self::new("recoIndex")
            .element(
                "recoIndex",
                &[
                    "docType",
                    "objType",
                    "objID",
                    "engineVersion",
                    "recoType",
                    "lang",
                    "objWidth",
                    "objHeight",
                ],
                &[],
            )
            .element("item", &["x", "y", "w", "h", "offset", "duration", "strokeList"], &[])
            .element("t", &["w"], &[])
            .element("object", &["type"], &[])
            .element("shape", &["type"], &[])
            .element("barcode", &["type"], &[])
    }
}

/// Streams the document against the schema; collects every violation
fn collect_validation_errors(input: &str, schema: &DtdSchema) -> Result<Vec<String>, EnmlError> {
    let mut reader = Reader::from_str(input);
    reader.config_mut().expand_empty_elements = true;

    let mut errors = Vec::new();
    let mut saw_root = false;
    let mut depth = 0usize;

    loop {
        match reader.read_event() {
            Err(e) => return Err(EnmlError::MalformedXml(e.to_string())),
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();

                if depth == 0 {
                    saw_root = true;
                    if name != schema.root_element {
                        errors.push(format!(
                            "unexpected root element {name}, expected {}",
                            schema.root_element
                        ));
                    }
                }
                depth += 1;

                let Some(decl) = schema.elements.get(&name) else {
                    errors.push(format!("no declaration for element {name}"));
                    continue;
                };

                let mut seen = HashSet::new();
                for attribute in e.attributes() {
                    let attribute =
                        attribute.map_err(|e| EnmlError::MalformedXml(e.to_string()))?;
                    let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
                    if !decl.allowed_attributes.contains(&key) {
                        errors.push(format!(
                            "no declaration for attribute {key} of element {name}"
                        ));
                    }
                    seen.insert(key);
                }

                for required in &decl.required_attributes {
                    if !seen.contains(required) {
                        errors.push(format!(
                            "required attribute {required} of element {name} is missing"
                        ));
                    }
                }
            }
            Ok(Event::End(_)) => {
                depth = depth.saturating_sub(1);
            }
            Ok(_) => {}
        }
    }

    if !saw_root {
        errors.push("document has no root element".to_string());
    }

    Ok(errors)
}

fn validate_against_schema(input: &str, schema: &DtdSchema) -> Result<(), EnmlError> {
    let errors = collect_validation_errors(input, schema)?;
    if errors.is_empty() {
        Ok(())
    } else {
        Err(EnmlError::Validation { errors })
    }
}

/// Validates an ENML document against the `enml2.dtd` schema
pub fn validate_enml(enml: &str) -> Result<(), EnmlError> {
    validate_against_schema(enml, &DtdSchema::enml())
}

/// Validates an ENEX document against the `evernote-export3.dtd` schema
pub fn validate_enex(enex: &str) -> Result<(), EnmlError> {
    validate_against_schema(enex, &DtdSchema::enex())
}

/// Validates a resource recognition index against the `recoIndex.dtd`
/// schema
pub fn validate_reco_index(reco_index: &str) -> Result<(), EnmlError> {
    validate_against_schema(reco_index, &DtdSchema::reco_index())
}

/// Validates ENML; on failure strips undeclared attributes per the
/// schema's allowlists and validates once more
///
/// Returns the (possibly fixed up) document. Errors other than undeclared
/// attributes cannot be fixed this way and surface as-is from the second
/// validation.
pub fn validate_and_fixup_enml(enml: &str, schema: &DtdSchema) -> Result<String, EnmlError> {
    match validate_against_schema(enml, schema) {
        Ok(()) => return Ok(enml.to_string()),
        Err(EnmlError::Validation { errors }) => {
            debug!(?errors, "ENML failed validation, attempting attribute fixup");
        }
        Err(other) => return Err(other),
    }

    let fixed = strip_undeclared_attributes(enml, schema)?;
    validate_against_schema(&fixed, schema)?;
    Ok(fixed)
}

/// Re-streams the document dropping attributes the schema does not
/// declare for their element
fn strip_undeclared_attributes(input: &str, schema: &DtdSchema) -> Result<String, EnmlError> {
    let mut reader = Reader::from_str(input);
    reader.config_mut().expand_empty_elements = true;

    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::DocType(BytesText::from_escaped(
        "en-note SYSTEM \"http://xml.evernote.com/pub/enml2.dtd\"",
    )))?;

    loop {
        match reader.read_event() {
            Err(e) => return Err(EnmlError::MalformedXml(e.to_string())),
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let mut start = BytesStart::new(name.clone());

                let allowed = schema.elements.get(&name).map(|d| &d.allowed_attributes);
                for attribute in e.attributes() {
                    let attribute =
                        attribute.map_err(|e| EnmlError::MalformedXml(e.to_string()))?;
                    let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();

                    let keep = allowed.map_or(true, |allowed| allowed.contains(&key));
                    if keep {
                        let value = attribute
                            .unescape_value()
                            .map_err(|e| EnmlError::MalformedXml(e.to_string()))?;
                        start.push_attribute((key.as_str(), value.as_ref()));
                    } else {
                        debug!(element = %name, attribute = %key, "Erasing undeclared attribute");
                    }
                }

                writer.write_event(Event::Start(start))?;
            }
            Ok(Event::End(e)) => {
                writer.write_event(Event::End(e.into_owned()))?;
            }
            Ok(Event::Text(t)) => {
                writer.write_event(Event::Text(t.into_owned()))?;
            }
            Ok(Event::CData(t)) => {
                writer.write_event(Event::CData(t.into_owned()))?;
            }
            Ok(_) => {}
        }
    }

    String::from_utf8(writer.into_inner()).map_err(|e| EnmlError::MalformedXml(e.to_string()))
}
