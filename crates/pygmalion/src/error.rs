//! Error types for Pygmalion operations.
//!
//! Errors fall into two tiers:
//!
//! - **Fatal startup**: the store cannot be opened, the schema cannot be
//!   created, or the on-disk version does not match this build. These abort
//!   the daemon.
//! - **Transient**: a single transaction or worker exchange failed. Facts are
//!   always recomputable from sources, so these are logged and the affected
//!   request is answered negatively while the daemon stays live.

use thiserror::Error;

/// Result type for Pygmalion operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for Pygmalion operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or truncated message on a wire channel
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invalid configuration or arguments
    #[error("configuration error: {0}")]
    Config(String),

    /// The on-disk store was written by an incompatible build.
    ///
    /// No automatic migration is attempted; the index is rebuildable, so the
    /// remedy is deleting the store file and re-indexing.
    #[error(
        "index database is version {found_major}.{found_minor} (tool {found_tool}), \
         this build requires {expected_major}.{expected_minor}"
    )]
    VersionMismatch {
        found_tool: String,
        found_major: i64,
        found_minor: i64,
        expected_major: i64,
        expected_minor: i64,
    },

    /// Invariant violation inside Pygmalion itself
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns `true` if the daemon must not continue past this error.
    ///
    /// Everything else is transient: the operation is dropped, the facts it
    /// would have produced are recomputable on the next re-index.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::VersionMismatch { .. } | Self::Config(_))
    }
}
