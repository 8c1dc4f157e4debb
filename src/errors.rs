//! Error hierarchy for the coordination-service client.
//!
//! Errors are grouped by how the retry policy treats them: connectivity
//! failures are masked and retried, node-level failures propagate to the
//! caller immediately, and a timeout marks an exhausted retry budget.

use std::time::Duration;

use config::ConfigError;

use crate::RawEventKind;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transient link/session failures, masked by the retry policy
    #[error(transparent)]
    Connectivity(#[from] ConnectivityError),

    /// Logical node-level failures, never retried
    #[error(transparent)]
    Node(#[from] NodeError),

    /// The retry budget for an operation ran out
    #[error("operation could not be retried further, retry budget of {budget:?} exhausted")]
    OperationTimeout { budget: Duration },

    /// A raw event kind outside the recognized data/children classes
    #[error("unsupported watch event {kind:?} for node {path}")]
    UnsupportedEvent { path: String, kind: RawEventKind },

    /// Client options validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Operation attempted on a closed client
    #[error("client has been closed")]
    Closed,

    /// Failure raised by an application-supplied change handler
    #[error("change handler failed: {0}")]
    Handler(String),

    /// Unrecoverable failures
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectivityError {
    /// The link to the ensemble dropped mid-operation
    #[error("connection to the coordination service was lost")]
    ConnectionLoss,

    /// The session timed out on the server side and cannot be resumed
    #[error("session has expired")]
    SessionExpired,

    /// Credentials were rejected during session negotiation
    #[error("authentication failed")]
    AuthFailed,
}

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Target node does not exist
    #[error("node {0} does not exist")]
    NotFound(String),

    /// Creation target already exists
    #[error("node {0} already exists")]
    AlreadyExists(String),

    /// Conditional write against a stale version
    #[error("version mismatch on {path} (expected {expected})")]
    BadVersion { path: String, expected: i32 },

    /// Node still has children and cannot be deleted
    #[error("node {0} has children")]
    NotEmpty(String),
}

impl Error {
    /// Whether the retry policy may mask this failure.
    ///
    /// Only connection loss and session expiry qualify; authentication
    /// failures are terminal.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Connectivity(ConnectivityError::ConnectionLoss)
                | Error::Connectivity(ConnectivityError::SessionExpired)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Node(NodeError::NotFound(_)))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::Node(NodeError::AlreadyExists(_)))
    }
}
