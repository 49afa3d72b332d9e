//! Error types for the node registry.

use thiserror::Error;

use crate::types::NodeState;

/// Result type alias for registry operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("node not found: {0}")]
    NotFound(String),

    #[error("node already exists: {0}")]
    AlreadyExists(String),

    #[error("write conflict on {hostname}: expected version {expected}, found {actual}")]
    Conflict {
        hostname: String,
        expected: u64,
        actual: u64,
    },

    #[error("illegal transition of {hostname} from {from} to {to}: {reason}")]
    IllegalTransition {
        hostname: String,
        from: NodeState,
        to: NodeState,
        reason: &'static str,
    },
}

impl StateError {
    /// Whether retrying on a fresh read may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StateError::Conflict { .. })
    }
}
