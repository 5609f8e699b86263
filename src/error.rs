//! Error types for the emoji store
//!
//! One enum per failure domain, matching the public operation surface:
//! opening a store, running a transaction, transforming a raw dataset,
//! loading it, and running queries.

use thiserror::Error;

/// The store directory could not be created, read, or validated.
#[derive(Error, Debug)]
pub enum OpenError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store pointer unreadable: {0}")]
    CorruptPointer(#[from] serde_json::Error),

    #[error("Unsupported store schema version {found} (expected {expected})")]
    SchemaVersion { found: u16, expected: u16 },

    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A read or write transaction aborted. Aborted writes leave the last
/// committed snapshot untouched.
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store pointer unreadable: {0}")]
    Pointer(#[from] serde_json::Error),

    #[error("Snapshot encoding error: {0}")]
    Snapshot(#[from] bincode::Error),

    #[error("Corrupt store data: {0}")]
    Corrupt(String),

    #[error("Store schema changed underneath us: found version {found}, expected {expected}")]
    SchemaVersion { found: u16, expected: u16 },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Store '{0}' is not in this transaction's scope")]
    OutOfScope(&'static str),

    #[error("Write attempted in a read-only transaction")]
    ReadOnly,

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// The raw dataset could not be turned into emoji records. Nothing is
/// written when transformation fails.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Dataset is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record {index}: {reason}")]
    BadRecord { index: usize, reason: String },
}

/// A bulk load failed, either before touching the store (transform) or
/// during the replace transaction.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

/// A read operation failed at the store level.
#[derive(Error, Debug)]
#[error("Query failed: {0}")]
pub struct QueryError(#[from] pub TransactionError);
