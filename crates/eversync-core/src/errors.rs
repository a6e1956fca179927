//! Error taxonomy
//!
//! Three layers of failure exist in the engine:
//!
//! - [`CoreError`] - configuration and protocol invariant violations
//!   (null collaborators, sync chunk without a high USN, note without a
//!   guid). Non-recoverable for the affected operation.
//! - [`RemoteError`] - failures reported by the remote service. Two of them
//!   are recognized specially because they stop a whole batch:
//!   rate limit reached and authentication expiry.
//! - [`StopSynchronizationError`] - the batch-wide stop condition recorded
//!   in download/send statuses once a stop-class remote error is seen.
//!
//! Adapters surface errors as `anyhow::Error` at port boundaries; the
//! engine inspects the chain with [`stop_synchronization_error`] to decide
//! whether to trip the shared canceler.

use thiserror::Error;

/// Library-level errors: bad arguments and protocol violations
#[derive(Debug, Error)]
pub enum CoreError {
    /// A collaborator or argument failed construction-time validation
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A protocol invariant was violated at runtime
    #[error("runtime error: {0}")]
    RuntimeError(String),

    /// The operation observed its canceler in the cancelled state
    #[error("operation canceled")]
    OperationCanceled,
}

/// Errors reported by the remote note store
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The service's API rate limit was exceeded; retry after the given
    /// number of seconds when known
    #[error("rate limit reached (retry after {duration_seconds:?} seconds)")]
    RateLimitReached { duration_seconds: Option<i32> },

    /// The authentication token expired mid-operation
    #[error("authentication expired")]
    AuthExpired,

    /// Any other service-side failure
    #[error("remote service error: {0}")]
    Other(String),
}

/// The condition that stopped a whole batch of per-item operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSynchronizationError {
    RateLimitReached { duration_seconds: Option<i32> },
    AuthenticationExpired,
}

/// Walks an error chain looking for a stop-class [`RemoteError`]
///
/// Returns `None` for ordinary per-item failures which must not cancel
/// sibling operations.
pub fn stop_synchronization_error(error: &anyhow::Error) -> Option<StopSynchronizationError> {
    for cause in error.chain() {
        if let Some(remote) = cause.downcast_ref::<RemoteError>() {
            match remote {
                RemoteError::RateLimitReached { duration_seconds } => {
                    return Some(StopSynchronizationError::RateLimitReached {
                        duration_seconds: *duration_seconds,
                    });
                }
                RemoteError::AuthExpired => {
                    return Some(StopSynchronizationError::AuthenticationExpired);
                }
                RemoteError::Other(_) => {}
            }
        }
    }
    None
}
