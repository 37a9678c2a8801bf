//! Error types
//!
//! Recording errors never reach the mutation call site; rollback and restore
//! fold apply errors into their summaries. What is left to propagate is
//! listed here.

use thiserror::Error;

use crate::types::Target;

/// Result type for EventStore operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from the backing store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// A persisted row could not be decoded
    #[error("Corrupt row {id} in {table}: {reason}")]
    Corrupt {
        table: &'static str,
        id: i64,
        reason: String,
    },
    /// The store or its worker is gone
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        StoreError::Unavailable(format!("blocking task failed: {}", e))
    }
}

/// Rollback/restore invoked with nothing resolvable to act on
///
/// Raised before any querying begins.
#[derive(Error, Debug)]
pub enum ScopeError {
    #[error("No region or actor given")]
    NoScope,
    #[error("No event category can match this scope")]
    NoCategories,
    #[error("Window start {start} is after end {end}")]
    InvertedWindow { start: i64, end: i64 },
    #[error("Rollback marker {0} not found")]
    MarkerNotFound(i64),
    #[error("Rollback marker {0} was already restored")]
    AlreadyRestored(i64),
    #[error("Could not load rollback marker: {0}")]
    Store(#[from] StoreError),
}

/// A single write rejected by the world port
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    #[error("Invalid location {0}")]
    InvalidLocation(Target),
    #[error("Region holding {0} is not loaded")]
    Unloaded(Target),
    #[error("Host rejected write to {target}: {reason}")]
    Rejected { target: Target, reason: String },
}

/// Malformed human time string
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Empty time string")]
    Empty,
    #[error("Missing number before unit '{0}'")]
    MissingNumber(char),
    #[error("Missing unit after '{0}'")]
    MissingUnit(String),
    #[error("Unknown time unit '{0}' (use s, m, h, d or w)")]
    UnknownUnit(char),
    #[error("Invalid number '{0}'")]
    InvalidNumber(String),
    #[error("Time span overflows")]
    Overflow,
}

/// Errors surfaced by the command facade
#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Scope(#[from] ScopeError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Actor {0} has no complete selection")]
    NoSelection(String),
}
