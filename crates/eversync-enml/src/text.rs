//! Plain-text and word-list extraction from note content

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::sync::OnceLock;

use crate::error::EnmlError;

fn word_splitter() -> &'static Regex {
    static SPLITTER: OnceLock<Regex> = OnceLock::new();
    SPLITTER.get_or_init(|| Regex::new(r"\W+").expect("static regex compiles"))
}

/// Concatenates the text nodes of an ENML document
///
/// Everything inside `en-media` and `en-crypt` elements is skipped: media
/// has no text and ciphertext is not text the user can search.
pub fn note_content_to_plain_text(note_content: &str) -> Result<String, EnmlError> {
    let mut reader = Reader::from_str(note_content);
    reader.config_mut().expand_empty_elements = true;

    let mut plain_text = String::new();
    let mut skip_depth = 0usize;

    loop {
        match reader.read_event() {
            Err(e) => return Err(EnmlError::MalformedXml(e.to_string())),
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                let name = e.name();
                let name = name.as_ref();
                if skip_depth > 0 || name == b"en-media" || name == b"en-crypt" {
                    skip_depth += 1;
                }
            }
            Ok(Event::End(_)) => {
                if skip_depth > 0 {
                    skip_depth -= 1;
                }
            }
            Ok(Event::Text(t)) => {
                if skip_depth == 0 {
                    plain_text.push_str(
                        &quick_xml::escape::unescape(
                            &t.decode()
                                .map_err(|e| EnmlError::MalformedXml(e.to_string()))?,
                        )
                        .map_err(|e| EnmlError::MalformedXml(e.to_string()))?,
                    );
                }
            }
            Ok(Event::CData(t)) => {
                if skip_depth == 0 {
                    plain_text.push_str(&String::from_utf8_lossy(t.as_ref()));
                }
            }
            Ok(_) => {}
        }
    }

    Ok(plain_text)
}

/// Splits plain text into words on `\W+`, dropping empty parts
pub fn plain_text_to_list_of_words(plain_text: &str) -> Vec<String> {
    word_splitter()
        .split(plain_text)
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}

/// Extracts the word list of an ENML document; optionally also hands back
/// the intermediate plain text
pub fn note_content_to_list_of_words(
    note_content: &str,
    plain_text_out: Option<&mut String>,
) -> Result<Vec<String>, EnmlError> {
    let plain_text = note_content_to_plain_text(note_content)?;
    let words = plain_text_to_list_of_words(&plain_text);
    if let Some(out) = plain_text_out {
        *out = plain_text;
    }
    Ok(words)
}
