//! Tag and attribute sets driving the HTML <-> ENML transforms
//!
//! The sets mirror the ENML format definition: `en-note` documents may
//! contain a fixed XHTML subset plus the Evernote-specific elements, and
//! a number of XHTML tags and attributes are banned outright.

/// Tags stripped from HTML together with their subtrees (except `object`,
/// which gets special en-crypt handling first)
pub const FORBIDDEN_XHTML_TAGS: &[&str] = &[
    "applet", "base", "basefont", "bgsound", "blink", "button", "dir", "embed", "fieldset",
    "form", "frame", "frameset", "head", "iframe", "ilayer", "input", "isindex", "label",
    "layer", "legend", "link", "marquee", "menu", "meta", "noframes", "noscript", "object",
    "optgroup", "option", "param", "plaintext", "script", "select", "style", "textarea", "xml",
];

/// XHTML tags ENML accepts verbatim
pub const ALLOWED_XHTML_TAGS: &[&str] = &[
    "a", "abbr", "acronym", "address", "area", "b", "bdo", "big", "blockquote", "br", "caption",
    "center", "cite", "code", "col", "colgroup", "dd", "del", "dfn", "div", "dl", "dt", "em",
    "font", "h1", "h2", "h3", "h4", "h5", "h6", "hr", "i", "img", "ins", "kbd", "li", "map",
    "ol", "p", "pre", "q", "s", "samp", "small", "span", "strike", "strong", "sub", "sup",
    "table", "tbody", "td", "tfoot", "th", "thead", "tt", "u", "ul", "var", "xmp",
];

/// The Evernote-specific elements
pub const EVERNOTE_SPECIFIC_XHTML_TAGS: &[&str] =
    &["en-note", "en-media", "en-crypt", "en-todo", "en-decrypted"];

/// Attributes stripped from every element during HTML -> ENML conversion
/// (on top of these, any attribute whose name starts with `on` is
/// stripped too)
pub const FORBIDDEN_XHTML_ATTRIBUTES: &[&str] = &[
    "id",
    "class",
    "accesskey",
    "data",
    "dynsrc",
    "tabindex",
    "contenteditable",
];

/// Attributes `en-media` elements may carry
pub const ALLOWED_EN_MEDIA_ATTRIBUTES: &[&str] = &[
    "hash", "type", "align", "alt", "longdesc", "height", "width", "border", "hspace", "vspace",
    "usemap", "style", "title", "lang", "xml:lang", "dir",
];

pub fn is_forbidden_xhtml_tag(name: &str) -> bool {
    FORBIDDEN_XHTML_TAGS.contains(&name)
}

pub fn is_allowed_xhtml_tag(name: &str) -> bool {
    ALLOWED_XHTML_TAGS.contains(&name)
}

pub fn is_evernote_specific_xhtml_tag(name: &str) -> bool {
    EVERNOTE_SPECIFIC_XHTML_TAGS.contains(&name)
}

pub fn is_forbidden_xhtml_attribute(name: &str) -> bool {
    FORBIDDEN_XHTML_ATTRIBUTES.contains(&name) || name.starts_with("on")
}

pub fn is_allowed_en_media_attribute(name: &str) -> bool {
    ALLOWED_EN_MEDIA_ATTRIBUTES.contains(&name)
}
