//! Error types for the ESL client

use thiserror::Error;

/// Result alias used throughout the crate.
pub type EslResult<T> = Result<T, EslError>;

/// Everything that can go wrong talking to an Event Socket server.
///
/// Replies that carry `-ERR` are *not* errors at this level; they are parsed
/// messages, inspected with [`EslMessage::has_error`](crate::EslMessage::has_error).
/// [`EslMessage::into_result`](crate::EslMessage::into_result) turns them into
/// [`EslError::CommandFailed`] when the caller prefers `?`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EslError {
    /// I/O error on an established socket, passed through unmodified.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An operation did not finish in time.
    #[error("operation timed out after {timeout_ms}ms")]
    Timeout {
        /// The bound that was exceeded.
        timeout_ms: u64,
    },

    /// Address resolution failed or every dial attempt was refused.
    #[error("unable to connect to {host} after {attempts} attempt(s): {source}")]
    ConnectionFailed {
        /// Normalized `host:port`.
        host: String,
        /// Number of dial attempts made (0 when resolution failed).
        attempts: u32,
        /// Last underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// The connection is not (or no longer) usable for commands.
    #[error("connection not ready")]
    NotConnected,

    /// A command carried the line terminator where it must not.
    #[error("malformed command: {message}")]
    MalformedCommand {
        /// What was wrong.
        message: String,
    },

    /// Host string did not have the `host[:port]` shape.
    #[error("invalid host structure, expected host:port, found: {host}")]
    MalformedHost {
        /// The host as given, untouched.
        host: String,
    },

    /// A frame declared `Content-Length: 0`.
    #[error("content length is zero")]
    ContentLengthZero,

    /// A header line could not be parsed.
    #[error("invalid header: {header}")]
    InvalidHeader {
        /// The offending line or value.
        header: String,
    },

    /// Frame shape did not match the protocol.
    #[error("protocol error: {message}")]
    ProtocolError {
        /// Description of the violation.
        message: String,
    },

    /// The handshake received something other than an auth request.
    #[error("unexpected Content-Type: expected {expected}, got {actual:?}")]
    UnexpectedContentType {
        /// Content-Type the handshake required.
        expected: String,
        /// Content-Type that arrived (may be empty).
        actual: String,
    },

    /// The server rejected the login.
    #[error("login error: {reason}")]
    LoginFailed {
        /// Error text reported by the server.
        reason: String,
    },

    /// The server replied without error but did not accept the login.
    #[error("unable to log in, no error returned (Reply-Text: {reply_text:?})")]
    LoginIncomplete {
        /// Reply-Text that was received instead of `+OK accepted`.
        reply_text: String,
    },

    /// A command reply carried `-ERR`.
    #[error("command failed: {reply_text}")]
    CommandFailed {
        /// Error text following `-ERR`.
        reply_text: String,
    },

    /// A reply was neither `+OK` nor `-ERR`.
    #[error("unexpected reply: {reply_text}")]
    UnexpectedReply {
        /// The raw Reply-Text.
        reply_text: String,
    },
}

impl EslError {
    /// Build a [`EslError::ProtocolError`].
    pub fn protocol_error(message: impl Into<String>) -> Self {
        EslError::ProtocolError {
            message: message.into(),
        }
    }

    /// Build a [`EslError::MalformedCommand`].
    pub fn malformed_command(message: impl Into<String>) -> Self {
        EslError::MalformedCommand {
            message: message.into(),
        }
    }

    /// Build a [`EslError::LoginFailed`].
    pub fn auth_failed(reason: impl Into<String>) -> Self {
        EslError::LoginFailed {
            reason: reason.into(),
        }
    }

    /// `true` for errors that mean the socket is gone or never came up.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            EslError::Io(_)
                | EslError::ConnectionFailed { .. }
                | EslError::ConnectionClosed
                | EslError::NotConnected
        )
    }

    /// `true` when the connection is still usable after this error.
    ///
    /// Framing errors leave the stream at an unknown offset, so they are not
    /// recoverable. Neither is a timeout: the client stays up, but the reply
    /// it is still owed has to arrive before the next command can complete.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EslError::MalformedCommand { .. }
                | EslError::CommandFailed { .. }
                | EslError::UnexpectedReply { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(EslError::ConnectionClosed.is_connection_error());
        assert!(EslError::NotConnected.is_connection_error());
        assert!(!EslError::ContentLengthZero.is_connection_error());

        assert!(EslError::malformed_command("x").is_recoverable());
        assert!(!EslError::Timeout { timeout_ms: 100 }.is_recoverable());
        assert!(!EslError::ContentLengthZero.is_recoverable());
        assert!(!EslError::protocol_error("desync").is_recoverable());
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            EslError::MalformedHost {
                host: "foo:1:2".into()
            }
            .to_string(),
            "invalid host structure, expected host:port, found: foo:1:2"
        );
        assert_eq!(
            EslError::auth_failed("invalid").to_string(),
            "login error: invalid"
        );
        assert_eq!(
            EslError::ContentLengthZero.to_string(),
            "content length is zero"
        );
    }
}
