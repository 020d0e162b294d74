use thiserror::Error;

use super::response::ResponseStatus;
use crate::client::Handle;

/// Driver error types
///
/// Errors are `Clone` because a resolved future hands its outcome back on
/// every `get()`.
#[derive(Error, Debug, Clone)]
pub enum DriverError {
    /// Address resolution, dial or handshake timeout
    #[error("Connect error: {0}")]
    ConnectError(String),

    /// Malformed handshake, frame or payload
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Server rejected the login credentials
    #[error("Auth error: {0}")]
    AuthError(String),

    /// Operation attempted on a closed connection
    #[error("Connection is closed")]
    ConnectionClosed,

    /// Request could not be written after its handle was allocated
    #[error("Send error: {0}")]
    SendError(String),

    /// The network listener stopped before a response arrived
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// A handle was delivered to more than once
    #[error("Handle {0} was already resolved")]
    DuplicateResolution(Handle),

    /// Frame exceeds the configured maximum size
    #[error("Message too large")]
    MessageTooLarge,

    /// The procedure ran but the server reported a failure status
    #[error("Server error ({status}): {message}")]
    ServerError {
        status: ResponseStatus,
        message: String,
    },
}

impl DriverError {
    /// True for errors that mean the connection itself is unusable
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            DriverError::ConnectionClosed
                | DriverError::ConnectionLost(_)
                | DriverError::ConnectError(_)
        )
    }
}
