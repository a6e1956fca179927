//! HTML cleaner port
//!
//! Arbitrary editor HTML is not well-formed XML. The converter runs input
//! through this collaborator (a tidy-style cleaner) before streaming it.

pub trait IHtmlCleaner: Send + Sync {
    /// Turns arbitrary HTML into well-formed XML
    fn html_to_xml(&self, html: &str) -> anyhow::Result<String>;
}
