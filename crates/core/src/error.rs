//! Error types for the validation statistics engine
//!
//! We use `thiserror` for automatic `Display`/`Error` trait implementations.
//! `EngineError` is the unified error type returned by every public
//! operation; the storage, ingest and aggregate layers define their own
//! narrower errors and funnel them into this one at their crate boundary.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Unified error type for the validation statistics engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A filesystem operation failed. Always propagated.
    #[error("I/O error on {path:?}: {source}")]
    IoFailure {
        /// Path the failing operation was performed against, if known.
        path: Option<PathBuf>,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A columnar file's footer or a row group failed to decode.
    ///
    /// Logged and skipped during aggregation; propagated from `paginate`/
    /// `count` only if no other file in the snapshot could satisfy the call.
    #[error("malformed file {file:?}: {cause}")]
    MalformedFile {
        /// File that failed to decode.
        file: PathBuf,
        /// Human-readable cause.
        cause: String,
    },

    /// A fact was missing a required field at write time. Dropped with a
    /// warning; never fails the enclosing call.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A filter clause could not be parsed into a predicate. The clause is
    /// dropped with a warning and the query proceeds.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// A snapshot is already open for writes by another caller.
    #[error("snapshot {0} is busy (already open for writes)")]
    Busy(i64),

    /// An operation deliberately not implemented at this layer.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// The summary sidecar could not be parsed; callers should fall back to
    /// live aggregation rather than propagate this.
    #[error("summary read failed for snapshot {snapshot_id}: {cause}")]
    SummaryUnavailable {
        /// Snapshot the summary belongs to.
        snapshot_id: i64,
        /// Human-readable cause.
        cause: String,
    },

    /// The requested snapshot does not exist or is not in a state that
    /// permits the attempted operation.
    #[error("invalid snapshot state for {snapshot_id}: {reason}")]
    InvalidState {
        /// Snapshot the call targeted.
        snapshot_id: i64,
        /// Why the state transition was rejected.
        reason: String,
    },
}

impl EngineError {
    /// Wrap a raw `io::Error` with the path that was being operated on.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        EngineError::IoFailure {
            path: Some(path.into()),
            source,
        }
    }

    /// True if the error reflects a missing or skippable file rather than a
    /// durable failure; aggregation and pagination use this to decide
    /// whether to continue with the next file.
    pub fn is_skippable(&self) -> bool {
        matches!(self, EngineError::MalformedFile { .. })
    }
}
