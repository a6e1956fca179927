//! Eversync ENML - note content transcoding
//!
//! ENML (Evernote Markup Language) is the service's wire format for note
//! content: an XHTML subset plus the Evernote-specific elements `en-note`
//! (root), `en-media`, `en-crypt`, `en-todo` and, client-side only,
//! `en-decrypted`. This crate provides:
//!
//! - [`Converter`] - streaming transforms between ENML and locally usable
//!   HTML, driven by an explicit conversion state machine
//! - [`validate`] - schema validation for ENML, ENEX and recognition-index
//!   documents, plus the attribute-stripping fixup pass
//! - [`enex`] - import and export of the ENEX interchange format with
//!   base64 resource bodies and MD5 hashing
//! - [`text`] - plain-text and word-list extraction from note content

pub mod converter;
pub mod enex;
pub mod error;
pub mod skip_rules;
pub mod tags;
pub mod text;
pub mod validate;

pub use converter::{Converter, NoteContentToHtmlExtraData};
pub use enex::{export_notes_to_enex, import_enex, EnexExportOptions, EnexImportResult};
pub use error::EnmlError;
pub use skip_rules::{Matcher, MatchRule, SkipHtmlElementRule};
pub use validate::{
    validate_and_fixup_enml, validate_enex, validate_enml, validate_reco_index, DtdSchema,
};
