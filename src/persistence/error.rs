//! Persistence error types.

use crate::core::MachineError;
use crate::persistence::backend::BackendError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the persistence layer, carrying the failing operation,
/// the path involved, and the underlying cause.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// A storage backend call failed.
    #[error("{operation} failed for '{path}': {source}")]
    Backend {
        /// Which backend operation failed (`save`, `load`, `delete`).
        operation: &'static str,
        /// The path handed to the backend.
        path: PathBuf,
        /// The backend's failure.
        #[source]
        source: BackendError,
    },

    /// Converting a snapshot to or from its wire projection failed.
    #[error("snapshot {operation} failed: {source}")]
    Serialization {
        /// Which direction failed (`serialize`, `deserialize`).
        operation: &'static str,
        /// The serde failure.
        #[source]
        source: serde_json::Error,
    },

    /// The snapshot did not pass [`is_valid`](crate::persistence::StateSnapshot::is_valid).
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// Restarting the machine at the snapshot position failed.
    #[error("restore into state '{state}' failed: {source}")]
    Restore {
        /// The snapshot's current state id.
        state: String,
        /// The machine error raised on restart.
        #[source]
        source: MachineError,
    },
}
