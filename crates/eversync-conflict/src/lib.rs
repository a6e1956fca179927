//! Eversync Conflict - Sync conflict resolution
//!
//! Provides:
//! - The default [`SimpleConflictResolver`] implementing the
//!   `ISyncConflictResolver` port
//! - Conflict-name generation for renamed local copies

pub mod error;
pub mod namer;
pub mod resolver;

pub use error::ConflictError;
pub use namer::ConflictNamer;
pub use resolver::SimpleConflictResolver;
