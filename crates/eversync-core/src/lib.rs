//! Eversync Core - Domain types and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Note`, `Notebook`, `Resource`, `Tag`,
//!   `SavedSearch`, `LinkedNotebook`, `SyncChunk`, `SyncState`
//! - **Port definitions** - Traits for adapters: `ILocalStore`, `INoteStore`,
//!   `INoteStoreProvider`, `ISyncConflictResolver`, `IDecryptedTextCache`
//! - **Error taxonomy** - Protocol errors, remote service errors, and the
//!   batch-wide stop conditions (rate limit, auth expiry)
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure data types with no external dependencies.
//! Ports define trait interfaces that adapter crates (or the embedding
//! application) implement. The synchronization engine and the ENML converter
//! orchestrate domain entities through these port interfaces.

pub mod config;
pub mod domain;
pub mod errors;
pub mod ports;
