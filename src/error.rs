//! Crate-level error type.
//!
//! The event router itself never fails: malformed frames and stale references
//! are dropped where they are detected. `ChatError` covers the edges around
//! it (local validation, configuration, the socket and the REST collaborator).

use thiserror::Error;

/// Errors surfaced by local actions, configuration and the transport shell.
#[derive(Debug, Error)]
pub enum ChatError {
    /// A local pre-flight check rejected the user's input. The text is shown
    /// verbatim in a blocking alert and is never sent to the server.
    #[error("{0}")]
    Validation(String),

    /// Adding a new distinct emoji would exceed the per-message cap.
    #[error("You can only add up to {limit} reactions")]
    TooManyReactions { limit: usize },

    /// An action referenced a message id that is not in the active thread.
    #[error("message '{0}' is not in the active thread")]
    UnknownMessage(String),

    /// The socket is not open.
    #[error("socket not connected")]
    NotConnected,

    /// The upload endpoint replied with a non-2xx status.
    #[error("upload failed with HTTP {status}: {detail}")]
    Upload { status: u16, detail: String },

    /// The bearer token could not be decoded.
    #[error("invalid token: {0}")]
    Token(String),

    /// A configuration file could not be read or parsed.
    #[error("config error in {path}: {detail}")]
    Config { path: String, detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

pub type Result<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_displays_verbatim() {
        let err = ChatError::Validation("Invalid command".to_string());
        assert_eq!(err.to_string(), "Invalid command");
    }

    #[test]
    fn test_too_many_reactions_message() {
        let err = ChatError::TooManyReactions { limit: 5 };
        assert_eq!(err.to_string(), "You can only add up to 5 reactions");
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ChatError = io.into();
        assert!(matches!(err, ChatError::Io(_)));
    }
}
