//! Sensor error taxonomy.

use thiserror::Error;

/// Errors surfaced by the interception pipeline.
///
/// Nothing here is fatal to the host process: hooks translate every
/// variant into a deferred decision or a dropped notification.
#[derive(Debug, Error)]
pub enum SensorError {
    /// A required argument was absent (e.g. no process context).
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// File metadata lookup failed.
    #[error("metadata lookup failed: {0}")]
    Metadata(#[source] std::io::Error),

    /// Absolute path resolution failed.
    #[error("path resolution failed: {0}")]
    PathResolve(#[source] std::io::Error),

    /// An interception scope could not be registered.
    #[error("scope registration failed: {0}")]
    Registration(&'static str),
}
