//! Incremental, non-blocking HTTP/1.x message parsing.
//!
//! This crate turns a byte stream into a sequence of structured parse
//! events without allocating per-message. The central type is
//! [`HttpParser`]: a resumable state machine that pulls bytes from a
//! [`Transport`](wireline_io::Transport), recognizes requests and
//! responses (including HTTP/0.9 simple requests, header continuation
//! folding, and chunked transfer-coding with trailers), and pushes
//! events into an [`EventSink`].
//!
//! ```
//! use wireline_http::{HttpParser, RecordingSink};
//! use wireline_io::MemoryEndpoint;
//!
//! let mut transport = MemoryEndpoint::with_input(b"GET /index HTTP/1.1\r\nHost: example\r\n\r\n");
//! let mut sink = RecordingSink::new();
//! let mut parser = HttpParser::new();
//! parser.parse(&mut transport, &mut sink)?;
//! assert_eq!(sink.headers(), vec![(b"Host".to_vec(), b"example".to_vec())]);
//! # Ok::<(), wireline_http::HttpParseError>(())
//! ```

#![deny(unsafe_code)]

mod chunk;
mod error;
mod event;
mod parser;

pub use chunk::{ChunkCursor, ChunkDecoder};
pub use error::HttpParseError;
pub use event::{EventSink, HttpEvent, RecordingSink};
pub use parser::{ContentFraming, HttpParser, ParseState, ParseStep, ParserConfig};
