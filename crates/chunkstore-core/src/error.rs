//! Error types for `chunkstore`.
//!
//! A single error enum is used across the crate so that transactional
//! callbacks, column operations, and snapshot I/O all propagate through the
//! same `Result` alias.

use thiserror::Error;

/// Result type alias for `chunkstore` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in `chunkstore` operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Referenced column does not exist in the registry.
    #[error("[CS-001] no such column '{0}'")]
    NoSuchColumn(String),

    /// Column (or index/sort-index) name already registered.
    #[error("[CS-002] column '{0}' already exists")]
    DuplicateColumn(String),

    /// Caller-supplied argument is malformed (empty name, nil predicate, ...).
    #[error("[CS-003] invalid argument: {0}")]
    InvalidArgument(String),

    /// Handle or key does not name a live row.
    #[error("[CS-004] not found: {0}")]
    NotFound(String),

    /// A typed reader/writer was bound to a column of the wrong kind.
    #[error("[CS-005] type mismatch on column '{column}': expected {expected}, found {found}")]
    TypeMismatch {
        /// Column the mismatch occurred on.
        column: String,
        /// Kind the reader/writer expected.
        expected: String,
        /// Kind the column actually has.
        found: String,
    },

    /// Snapshot or replay framing is malformed.
    #[error("[CS-006] serialization error: {0}")]
    SerializationError(String),

    /// A transactional callback returned an error, forcing rollback.
    #[error("[CS-007] transaction aborted by caller: {0}")]
    UserAbort(String),

    /// Snapshot stream declares a version this build does not understand.
    #[error("[CS-008] unsupported snapshot version: {0}")]
    VersionMismatch(u64),

    /// Underlying I/O failure (snapshot stream, replication sink).
    #[error("[CS-009] io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns a short machine-readable error code, e.g. `"CS-001"`.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NoSuchColumn(_) => "CS-001",
            Self::DuplicateColumn(_) => "CS-002",
            Self::InvalidArgument(_) => "CS-003",
            Self::NotFound(_) => "CS-004",
            Self::TypeMismatch { .. } => "CS-005",
            Self::SerializationError(_) => "CS-006",
            Self::UserAbort(_) => "CS-007",
            Self::VersionMismatch(_) => "CS-008",
            Self::Io(_) => "CS-009",
        }
    }
}
