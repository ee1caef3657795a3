use std::path::PathBuf;

use depot_types::ArchiveId;

/// Errors from archive operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested record was not found.
    #[error("record not found: {0}")]
    NotFound(ArchiveId),

    /// Recomputed hash does not match the id a record was filed under.
    #[error("hash mismatch: filed as {expected}, computed {computed}")]
    HashMismatch {
        expected: ArchiveId,
        computed: ArchiveId,
    },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from snapshot persistence.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot could not be moved into place.
    #[error("failed to persist snapshot to {path}: {reason}")]
    Persist { path: PathBuf, reason: String },

    /// The record data is malformed or cannot be decoded.
    #[error("corrupt record {id}: {reason}")]
    CorruptRecord { id: ArchiveId, reason: String },

    /// The archive cannot be reached; nothing was accepted.
    #[error("archive unavailable: {0}")]
    Unavailable(String),

    /// No package was accepted under this ticket.
    #[error("unknown ingest ticket: {0}")]
    UnknownTicket(u64),

    /// An internal lock was poisoned by a panicking writer.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Result alias for archive operations.
pub type StoreResult<T> = Result<T, StoreError>;
