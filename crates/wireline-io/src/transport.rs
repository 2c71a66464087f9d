//! Non-blocking endpoint contract.

use std::io;

use crate::window::ByteWindow;

/// Outcome of a single non-blocking fill attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// Bytes were appended to the window.
    Read(usize),
    /// Nothing available right now; try again when readiness is signaled.
    Idle,
    /// The peer closed the stream; no further bytes will arrive.
    Eof,
}

/// Connection-level transport failure.
#[derive(Debug)]
pub enum TransportError {
    /// The endpoint is closed.
    Closed,
    /// An underlying I/O operation failed.
    Io(io::Error),
    /// A protocol layer (such as a TLS engine) reported a fatal condition.
    Protocol(&'static str),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "endpoint closed"),
            Self::Io(e) => write!(f, "i/o error: {e}"),
            Self::Protocol(detail) => write!(f, "protocol failure: {detail}"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// A non-blocking byte-stream endpoint.
///
/// Implementations never wait for readiness: a fill with nothing
/// available returns [`FillOutcome::Idle`], and a flush that cannot make
/// progress returns `Ok(0)`. The reactor that owns the connection is
/// responsible for re-invoking these when readiness is signaled, and for
/// idle timeouts and cancellation.
pub trait Transport {
    /// Append available bytes to `window` without blocking.
    fn fill(&mut self, window: &mut ByteWindow) -> Result<FillOutcome, TransportError>;

    /// Write readable bytes from `window`, consuming what was written.
    ///
    /// Returns the count written, which may be zero.
    fn flush(&mut self, window: &mut ByteWindow) -> Result<usize, TransportError>;

    /// Returns true while the endpoint is open.
    fn is_open(&self) -> bool;

    /// Close the endpoint. Idempotent.
    fn close(&mut self) -> Result<(), TransportError>;
}
