use thiserror::Error;

use crate::db::DocumentId;
use crate::ws::actor::ConnectionState;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Connect-time and terminal for the connection
    #[error("not authorized to access document {0}")]
    AuthorizationDenied(DocumentId),
    #[error("malformed message: {0}")]
    MalformedMessage(#[from] serde_json::Error),
    #[error("unknown action {0}")]
    UnknownAction(String),
    #[error("document {0} is no longer available")]
    PersistenceUnavailable(DocumentId),
    #[error("operation not allowed while connection is {0:?}")]
    InvalidState(ConnectionState),
}

impl SessionError {
    /// Whether the connection may keep running after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SessionError::MalformedMessage(_) | SessionError::UnknownAction(_))
    }
}
