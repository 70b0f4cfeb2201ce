//! Wire-level errors of the NNTP adapter.

use thiserror::Error;

use crate::error::Error;

/// Errors raised while talking NNTP.
///
/// These stay inside the adapter; [`NntpError::into_store_error`] maps them
/// onto the crate-wide [`Error`] taxonomy.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NntpError {
    /// The server answered with a response that does not fit the command.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The server answered with a 4xx or 5xx status.
    #[error("protocol error {code}: {message}")]
    Protocol {
        /// Response code from the server
        code: u16,
        /// Response text from the server
        message: String,
    },

    /// A response could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),

    /// A command parameter was rejected before sending.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// Reading or writing the socket failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// The connection could not be established or was closed.
    #[error("connection error: {0}")]
    Connection(String),
}

impl From<std::io::Error> for NntpError {
    fn from(err: std::io::Error) -> Self {
        NntpError::Io(err.to_string())
    }
}

impl NntpError {
    /// Whether the session is unusable after this error.
    pub fn breaks_session(&self) -> bool {
        matches!(
            self,
            NntpError::Io(_)
                | NntpError::Connection(_)
                | NntpError::Parse(_)
                | NntpError::InvalidResponse(_)
        ) || matches!(self, NntpError::Protocol { code: 400 | 502 | 503, .. })
    }

    /// Map onto the crate error for a store operation.
    ///
    /// Status codes without a specific meaning for the operation become
    /// [`Error::BackendUnavailable`].
    pub fn into_store_error(self) -> Error {
        match self {
            NntpError::Protocol { code, message } => {
                Error::BackendUnavailable(format!("{code} {message}"))
            }
            NntpError::InvalidCommand(message) => Error::BackendUnavailable(message),
            other => Error::BackendUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breaks_session() {
        assert!(NntpError::Io("reset".into()).breaks_session());
        assert!(NntpError::Connection("closed".into()).breaks_session());
        assert!(NntpError::Protocol {
            code: 400,
            message: "service discontinued".into()
        }
        .breaks_session());
        assert!(!NntpError::Protocol {
            code: 430,
            message: "no such article".into()
        }
        .breaks_session());
        assert!(!NntpError::InvalidCommand("bad".into()).breaks_session());
    }

    #[test]
    fn test_into_store_error() {
        let err = NntpError::Protocol {
            code: 502,
            message: "access denied".into(),
        }
        .into_store_error();
        assert_eq!(err, Error::BackendUnavailable("502 access denied".into()));
        assert!(NntpError::Io("reset".into()).into_store_error().is_transient());
    }
}
