//! Parse failure taxonomy.
//!
//! Every fatal kind leaves the parser in a terminal failed state; the
//! connection must be discarded. There is no recovery from mid-message
//! corruption.

use wireline_io::TransportError;

/// HTTP parsing error.
#[derive(Debug)]
pub enum HttpParseError {
    /// Malformed start-line, header, or chunk syntax.
    Framing(&'static str),
    /// A token or header section exceeded the configured window capacity.
    LimitExceeded(&'static str),
    /// The underlying transport (or the event sink) failed.
    Transport(TransportError),
    /// The stream closed in the middle of a message.
    Truncated {
        /// Body bytes delivered before the stream closed.
        received: u64,
    },
    /// The parser already failed; reset it or discard the connection.
    Failed,
}

impl std::fmt::Display for HttpParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Framing(detail) => write!(f, "framing error: {detail}"),
            Self::LimitExceeded(detail) => write!(f, "limit exceeded: {detail}"),
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Truncated { received } => {
                write!(f, "stream closed mid-message after {received} body bytes")
            }
            Self::Failed => write!(f, "parser is in a failed state"),
        }
    }
}

impl std::error::Error for HttpParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for HttpParseError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<std::io::Error> for HttpParseError {
    fn from(e: std::io::Error) -> Self {
        Self::Transport(TransportError::Io(e))
    }
}
