//! Error types for peerboard

use thiserror::Error;

/// Main error type for peerboard operations
#[derive(Error, Debug)]
pub enum BoardError {
    /// Stored document could not be read
    #[error("Store read error: {0}")]
    StoreRead(String),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Rejected user input; the message is user-facing and should be routed
    /// to the notification/toast surface
    #[error("{0}")]
    Validation(String),

    /// Peer connection failed or dropped
    #[error("Transport error: {0}")]
    Transport(String),

    /// Peer id is not registered with the rendezvous hub
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// Database creation/opening error
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table error
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    /// Storage operation error
    #[error("Storage operation error: {0}")]
    StorageOp(#[from] redb::StorageError),

    /// Commit error
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BoardError {
    /// Whether this error should be shown to the user (vs. logged only).
    ///
    /// Only validation failures surface to the toast layer; everything else
    /// is recovered internally (empty default, dropped connection).
    pub fn is_user_facing(&self) -> bool {
        matches!(self, BoardError::Validation(_))
    }
}

/// Result type alias using BoardError
pub type BoardResult<T> = Result<T, BoardError>;
