//! ENML error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnmlError {
    /// The input could not be parsed as XML
    #[error("malformed XML: {0}")]
    MalformedXml(String),

    /// The document failed schema validation (after the fixup attempt,
    /// where one applies)
    #[error("document is invalid: {}", .errors.join("; "))]
    Validation { errors: Vec<String> },

    /// A structural rule of the format was violated
    /// (e.g. en-media without a hash, a tag element outside of a note)
    #[error("{0}")]
    InvalidStructure(String),

    /// The HTML cleaner collaborator failed
    #[error("failed to clean up the note's html: {0}")]
    HtmlCleanup(String),

    /// A decrypted text block could not be matched back to its ciphertext
    #[error("{0}")]
    DecryptedText(String),

    /// ENEX-specific limits and rules
    #[error("{0}")]
    Enex(String),
}

impl From<quick_xml::Error> for EnmlError {
    fn from(e: quick_xml::Error) -> Self {
        EnmlError::MalformedXml(e.to_string())
    }
}

impl From<std::io::Error> for EnmlError {
    fn from(e: std::io::Error) -> Self {
        EnmlError::MalformedXml(format!("failed to write XML: {e}"))
    }
}
