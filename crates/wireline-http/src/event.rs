//! Parse event sink.
//!
//! The parser pushes structured events into an [`EventSink`] as it
//! recognizes pieces of a message. Byte-slice arguments are transient
//! zero-copy views into the parser's window, valid only for the duration
//! of the call; a sink that retains them must copy.
//!
//! # Re-entry
//!
//! `on_headers_complete` and `on_message_complete` are sanctioned points
//! for the driver to act before parsing resumes: the parser returns to
//! its caller immediately after emitting them, so "re-entering the
//! parser from a callback" is expressed as calling
//! [`parse_next`][crate::HttpParser::parse_next] again rather than as
//! call-stack recursion. The depth of that loop is bounded by the number
//! of buffered messages, not by stack.

use std::io;

/// Receiver for parse events.
///
/// All methods may fail with an I/O-kind error, which aborts parsing and
/// fails the parser.
pub trait EventSink {
    /// A request line was recognized. `version` is `None` for an
    /// HTTP/0.9-style request with no version field.
    fn on_request_start(
        &mut self,
        method: &str,
        target: &str,
        version: Option<&str>,
    ) -> io::Result<()> {
        let _ = (method, target, version);
        Ok(())
    }

    /// A status line was recognized.
    fn on_response_start(&mut self, version: &str, status: u16, reason: &str) -> io::Result<()> {
        let _ = (version, status, reason);
        Ok(())
    }

    /// A finalized header (continuation folding already resolved).
    /// Also called for trailer headers after the final chunk.
    fn on_header(&mut self, name: &[u8], value: &[u8]) -> io::Result<()> {
        let _ = (name, value);
        Ok(())
    }

    /// The header section ended and the body framing is decided.
    fn on_headers_complete(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// A run of body bytes. `offset` is the cumulative body position.
    fn on_body(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        let _ = (offset, bytes);
        Ok(())
    }

    /// The message ended; `total` is the delivered body length.
    fn on_message_complete(&mut self, total: u64) -> io::Result<()> {
        let _ = total;
        Ok(())
    }
}

// ============================================================================
// Recording sink
// ============================================================================

/// An owned copy of a single parse event, as captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpEvent {
    /// Request line.
    RequestStart {
        /// Request method.
        method: String,
        /// Request target.
        target: String,
        /// Protocol version; `None` for HTTP/0.9.
        version: Option<String>,
    },
    /// Status line.
    ResponseStart {
        /// Protocol version.
        version: String,
        /// Status code.
        status: u16,
        /// Reason phrase.
        reason: String,
    },
    /// One finalized header.
    Header {
        /// Header name bytes.
        name: Vec<u8>,
        /// Header value bytes.
        value: Vec<u8>,
    },
    /// End of the header section.
    HeadersComplete,
    /// One run of body bytes.
    Body {
        /// Cumulative body offset.
        offset: u64,
        /// The delivered bytes.
        bytes: Vec<u8>,
    },
    /// End of the message.
    MessageComplete {
        /// Total body length delivered.
        total: u64,
    },
}

/// Sink that copies every event into a `Vec`, for tests and tooling.
#[derive(Debug, Default)]
pub struct RecordingSink {
    /// Captured events in emission order.
    pub events: Vec<HttpEvent>,
}

impl RecordingSink {
    /// Create an empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Concatenation of all delivered body bytes.
    #[must_use]
    pub fn body(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for ev in &self.events {
            if let HttpEvent::Body { bytes, .. } = ev {
                out.extend_from_slice(bytes);
            }
        }
        out
    }

    /// All captured headers as owned `(name, value)` pairs.
    #[must_use]
    pub fn headers(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.events
            .iter()
            .filter_map(|ev| match ev {
                HttpEvent::Header { name, value } => Some((name.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn on_request_start(
        &mut self,
        method: &str,
        target: &str,
        version: Option<&str>,
    ) -> io::Result<()> {
        self.events.push(HttpEvent::RequestStart {
            method: method.to_string(),
            target: target.to_string(),
            version: version.map(ToString::to_string),
        });
        Ok(())
    }

    fn on_response_start(&mut self, version: &str, status: u16, reason: &str) -> io::Result<()> {
        self.events.push(HttpEvent::ResponseStart {
            version: version.to_string(),
            status,
            reason: reason.to_string(),
        });
        Ok(())
    }

    fn on_header(&mut self, name: &[u8], value: &[u8]) -> io::Result<()> {
        self.events.push(HttpEvent::Header {
            name: name.to_vec(),
            value: value.to_vec(),
        });
        Ok(())
    }

    fn on_headers_complete(&mut self) -> io::Result<()> {
        self.events.push(HttpEvent::HeadersComplete);
        Ok(())
    }

    fn on_body(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        self.events.push(HttpEvent::Body {
            offset,
            bytes: bytes.to_vec(),
        });
        Ok(())
    }

    fn on_message_complete(&mut self, total: u64) -> io::Result<()> {
        self.events.push(HttpEvent::MessageComplete { total });
        Ok(())
    }
}
