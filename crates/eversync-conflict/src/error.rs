//! Error types for conflict resolution

use thiserror::Error;

/// Errors that can occur while resolving sync conflicts
#[derive(Debug, Error)]
pub enum ConflictError {
    /// The conflicting entities are missing a field resolution depends on
    #[error("conflicting entity is missing {0}")]
    MissingField(&'static str),

    /// No free conflict name could be found within the probe limit
    #[error("could not find a free conflict name for \"{0}\"")]
    NoFreeName(String),

    /// Local store lookup failed while probing names
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}
