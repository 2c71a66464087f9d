//! Incremental HTTP/1.x message parser.
//!
//! [`HttpParser`] consumes bytes from its [`ByteWindow`] (filled from a
//! [`Transport`]) and drives a byte-at-a-time state machine that
//! recognizes a request-line or status-line, header lines (including
//! obsolete line-folding continuations), and a body delimited by
//! Content-Length, chunked transfer-coding, or connection close. Events
//! are pushed into an [`EventSink`].
//!
//! # Zero-Copy Design
//!
//! Tokens (method, target, version, header name, header value) are
//! offset ranges into the parser's window and are resolved to slices
//! only at the moment an event is emitted. A header value that spans
//! folded physical lines can no longer be a contiguous slice, so it is
//! copied into an owned accumulator at that point. The window is never
//! compacted mid-message; compaction is deferred to [`reset`] at the
//! message boundary, which keeps token ranges stable.
//!
//! # Non-Blocking Stepping
//!
//! [`parse_next`] performs at most one logical advance and never waits:
//! with nothing buffered it attempts exactly one fill, and a transport
//! that has nothing to offer yields [`ParseStep::NeedInput`]. The
//! blocking driver [`parse`] and the drain-what-is-buffered driver
//! [`parse_available`] are loops over `parse_next`.
//!
//! [`parse`]: HttpParser::parse
//! [`parse_next`]: HttpParser::parse_next
//! [`parse_available`]: HttpParser::parse_available
//! [`reset`]: HttpParser::reset

use std::ops::Range;

use wireline_io::{ByteWindow, FillOutcome, Transport};

use crate::chunk::{ChunkDecoder, ChunkStep};
use crate::error::HttpParseError;
use crate::event::EventSink;

const CR: u8 = b'\r';
const LF: u8 = b'\n';

/// How the message body's length is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFraming {
    /// Header section not finished yet.
    Unknown,
    /// No body follows the headers.
    NoContent,
    /// Body runs until the peer closes the stream.
    EofDelimited,
    /// Body is exactly this many bytes.
    Fixed(u64),
    /// Body uses chunked transfer-coding.
    Chunked,
}

/// Parser state. Transitions are monotonic forward within a message;
/// only [`HttpParser::reset`] goes back to `Start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// Skipping inter-message padding before the start line.
    Start,
    /// First start-line field (method, or version for a response).
    Field0,
    /// Whitespace after the first field.
    Space1,
    /// Second field (target, or status code).
    Field1,
    /// Whitespace after the second field.
    Space2,
    /// Third field (version, or reason phrase).
    Field2,
    /// At the start of a header line.
    Header,
    /// Inside a header name.
    HeaderName,
    /// Inside a header value.
    HeaderValue,
    /// Delivering a fixed-length body.
    Content,
    /// Delivering a close-delimited body.
    EofContent,
    /// Inside chunked transfer-coding framing.
    Chunked,
    /// Message complete.
    End,
    /// A fatal error occurred; the connection must be discarded.
    Failed,
}

impl ParseState {
    fn is_header_phase(self) -> bool {
        matches!(
            self,
            Self::Start
                | Self::Field0
                | Self::Space1
                | Self::Field1
                | Self::Space2
                | Self::Field2
                | Self::Header
                | Self::HeaderName
                | Self::HeaderValue
        )
    }

    fn is_body_phase(self) -> bool {
        matches!(self, Self::Content | Self::EofContent | Self::Chunked)
    }
}

/// Outcome of a single [`HttpParser::parse_next`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStep {
    /// Bytes were consumed and/or one event was emitted.
    Progress,
    /// Nothing buffered and the transport has nothing to offer yet.
    NeedInput,
    /// The current message is complete; call [`HttpParser::reset`]
    /// before parsing the next one.
    MessageComplete,
    /// The stream closed cleanly at a message boundary.
    StreamClosed,
}

/// Construction-time parser settings, plain numbers only.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    header_window_size: usize,
    lenient_content_length: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            header_window_size: 8 * 1024,
            lenient_content_length: false,
        }
    }
}

impl ParserConfig {
    /// Create the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the parse window capacity in bytes. The whole header section
    /// of a message must fit in this window.
    #[must_use]
    pub fn with_header_window_size(mut self, size: usize) -> Self {
        self.header_window_size = size;
        self
    }

    /// Coerce malformed or non-positive Content-Length values to "no
    /// content" instead of rejecting the message.
    ///
    /// Strict rejection is the default; this switch exists for
    /// compatibility with permissive real-world senders.
    #[must_use]
    pub fn with_lenient_content_length(mut self, lenient: bool) -> Self {
        self.lenient_content_length = lenient;
        self
    }

    /// Returns the parse window capacity.
    #[must_use]
    pub fn header_window_size(&self) -> usize {
        self.header_window_size
    }

    /// Returns true if malformed Content-Length values are coerced.
    #[must_use]
    pub fn lenient_content_length(&self) -> bool {
        self.lenient_content_length
    }
}

/// Header names the parser dispatches on while framing the body.
///
/// A fixed lookup with no mutable interning state; everything else is
/// passed through to the sink untouched.
#[derive(Debug, Clone, Copy)]
enum KnownHeader {
    ContentLength,
    TransferEncoding,
    ContentType,
}

impl KnownHeader {
    fn lookup(name: &[u8]) -> Option<Self> {
        if name.eq_ignore_ascii_case(b"content-length") {
            Some(Self::ContentLength)
        } else if name.eq_ignore_ascii_case(b"transfer-encoding") {
            Some(Self::TransferEncoding)
        } else if name.eq_ignore_ascii_case(b"content-type") {
            Some(Self::ContentType)
        } else {
            None
        }
    }
}

/// Incremental HTTP/1.x parser, one instance per connection.
///
/// Created once and [`reset`][Self::reset] between messages on a
/// persistent connection; buffers are kept, state and tokens cleared.
#[derive(Debug)]
pub struct HttpParser {
    config: ParserConfig,
    state: ParseState,
    window: ByteWindow,
    /// Remembered line terminator; a CR here absorbs an immediately
    /// following LF as the same terminator.
    eol: u8,
    /// Response-vs-request heuristic: second field starts with 1-5.
    response: bool,
    framing: ContentFraming,
    has_content_hint: bool,
    content_pos: u64,
    /// First token of the current line (header name, or start-line field).
    tok0: Range<usize>,
    /// Second token of the current line (header value, or start-line field).
    tok1: Range<usize>,
    /// Length of the token currently being scanned; `None` before its
    /// first byte.
    tok_len: Option<usize>,
    /// Owned accumulator for a value spanning folded lines.
    folded: Option<Vec<u8>>,
    /// Parsing trailer headers after the final chunk.
    trailers: bool,
    chunk: ChunkDecoder,
}

impl Default for HttpParser {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpParser {
    /// Create a parser with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ParserConfig::default())
    }

    /// Create a parser with the given settings.
    #[must_use]
    pub fn with_config(config: ParserConfig) -> Self {
        let window = ByteWindow::with_capacity(config.header_window_size);
        Self {
            config,
            state: ParseState::Start,
            window,
            eol: 0,
            response: false,
            framing: ContentFraming::Unknown,
            has_content_hint: false,
            content_pos: 0,
            tok0: 0..0,
            tok1: 0..0,
            tok_len: None,
            folded: None,
            trailers: false,
            chunk: ChunkDecoder::new(),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Returns the body framing decided at the end of the header section.
    #[must_use]
    pub fn framing(&self) -> ContentFraming {
        self.framing
    }

    /// Cumulative body bytes delivered for the current message.
    #[must_use]
    pub fn content_position(&self) -> u64 {
        self.content_pos
    }

    /// Returns true if the current message was recognized as a response.
    #[must_use]
    pub fn is_response(&self) -> bool {
        self.response
    }

    /// Returns true while parsing the start line or header section.
    #[must_use]
    pub fn in_header_phase(&self) -> bool {
        self.state.is_header_phase() && !self.trailers
    }

    /// Returns true while delivering body bytes or chunk framing.
    #[must_use]
    pub fn in_body_phase(&self) -> bool {
        self.state.is_body_phase() || (self.state.is_header_phase() && self.trailers)
    }

    /// Returns true once the current message is complete.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state == ParseState::End
    }

    /// Prepare for the next message on the same connection.
    ///
    /// Keeps the window and any buffered (pipelined) bytes; clears
    /// state, tokens, and framing. A dangling LF from a CRLF pair that
    /// straddled the message boundary is absorbed here. This is also
    /// the deferred compaction point for the window.
    pub fn reset(&mut self) {
        self.state = ParseState::Start;
        self.framing = ContentFraming::Unknown;
        self.has_content_hint = false;
        self.response = false;
        self.content_pos = 0;
        self.tok0 = 0..0;
        self.tok1 = 0..0;
        self.tok_len = None;
        self.folded = None;
        self.trailers = false;
        self.chunk.reset();

        if self.eol == CR && self.window.peek() == Some(LF) {
            self.window.take();
            self.eol = LF;
        }
        self.window.compact();
    }

    /// Parse until the current message completes.
    ///
    /// Intended for blocking transports; a transport that keeps
    /// answering "idle" makes this loop busy-poll, so reactor-driven
    /// callers should use [`parse_next`][Self::parse_next] instead.
    /// If the previous message completed, the parser is reset first.
    pub fn parse<T, S>(
        &mut self,
        transport: &mut T,
        sink: &mut S,
    ) -> Result<ParseStep, HttpParseError>
    where
        T: Transport + ?Sized,
        S: EventSink + ?Sized,
    {
        if self.state == ParseState::End {
            self.reset();
        }
        loop {
            match self.parse_next(transport, sink)? {
                step @ (ParseStep::MessageComplete | ParseStep::StreamClosed) => return Ok(step),
                ParseStep::Progress | ParseStep::NeedInput => {}
            }
        }
    }

    /// Step the parser while buffered bytes remain, without waiting for
    /// more input than a single fill attempt provides.
    pub fn parse_available<T, S>(
        &mut self,
        transport: &mut T,
        sink: &mut S,
    ) -> Result<ParseStep, HttpParseError>
    where
        T: Transport + ?Sized,
        S: EventSink + ?Sized,
    {
        let mut step = self.parse_next(transport, sink)?;
        while step == ParseStep::Progress && !self.window.is_empty() {
            step = self.parse_next(transport, sink)?;
        }
        Ok(step)
    }

    /// Consume available bytes and perform at most one logical advance,
    /// emitting at most one primary event.
    ///
    /// Terminal completion (`on_message_complete`) is emitted together
    /// with the advance that reaches it. Never blocks: an empty window
    /// triggers exactly one fill attempt, and an idle transport yields
    /// [`ParseStep::NeedInput`].
    ///
    /// On error the parser enters [`ParseState::Failed`] and stays
    /// there; the connection must be discarded.
    pub fn parse_next<T, S>(
        &mut self,
        transport: &mut T,
        sink: &mut S,
    ) -> Result<ParseStep, HttpParseError>
    where
        T: Transport + ?Sized,
        S: EventSink + ?Sized,
    {
        match self.step(transport, sink) {
            Ok(step) => Ok(step),
            Err(HttpParseError::Failed) => Err(HttpParseError::Failed),
            Err(e) => {
                tracing::debug!(error = %e, "parse failed");
                self.state = ParseState::Failed;
                Err(e)
            }
        }
    }

    fn step<T, S>(&mut self, transport: &mut T, sink: &mut S) -> Result<ParseStep, HttpParseError>
    where
        T: Transport + ?Sized,
        S: EventSink + ?Sized,
    {
        match self.state {
            ParseState::Failed => return Err(HttpParseError::Failed),
            ParseState::End => return Ok(ParseStep::MessageComplete),
            ParseState::Content => {
                if let ContentFraming::Fixed(total) = self.framing
                    && self.content_pos == total
                {
                    self.state = ParseState::End;
                    sink.on_message_complete(self.content_pos)?;
                    return Ok(ParseStep::MessageComplete);
                }
            }
            _ => {}
        }

        if self.window.is_empty() {
            if self.window.space() == 0 {
                if self.tokens_live() {
                    return Err(HttpParseError::LimitExceeded(
                        "header section exceeds window capacity",
                    ));
                }
                self.window.clear();
            }
            match transport.fill(&mut self.window)? {
                FillOutcome::Read(_) => {}
                FillOutcome::Idle => return Ok(ParseStep::NeedInput),
                FillOutcome::Eof => return self.stream_closed(sink),
            }
        }

        // Start-line and header states consume one byte at a time.
        while self.state.is_header_phase() && !self.window.is_empty() {
            let Some(ch) = self.window.take() else { break };
            if self.eol == CR && ch == LF {
                self.eol = LF;
                continue;
            }
            self.eol = 0;
            if let Some(step) = self.step_header(ch, sink)? {
                return Ok(step);
            }
        }

        // Body states deliver runs of bytes.
        while self.state.is_body_phase() && !self.window.is_empty() {
            if self.eol == CR && self.window.peek() == Some(LF) {
                self.window.take();
                self.eol = LF;
                continue;
            }
            if let Some(step) = self.step_body(sink)? {
                return Ok(step);
            }
        }

        Ok(ParseStep::Progress)
    }

    // ========================================================================
    // Start line and headers
    // ========================================================================

    #[allow(clippy::too_many_lines)]
    fn step_header<S>(&mut self, ch: u8, sink: &mut S) -> Result<Option<ParseStep>, HttpParseError>
    where
        S: EventSink + ?Sized,
    {
        match self.state {
            ParseState::Start => {
                self.framing = ContentFraming::Unknown;
                if ch > b' ' {
                    self.window.mark();
                    self.state = ParseState::Field0;
                }
                // control bytes and whitespace before the first printable
                // byte are inter-message padding, quietly skipped
            }

            ParseState::Field0 => {
                if ch == b' ' {
                    self.tok0 = self.window.range_from_mark();
                    self.state = ParseState::Space1;
                } else if ch < b' ' {
                    return Err(HttpParseError::Framing("control byte in start line"));
                }
            }

            ParseState::Space1 => {
                if ch > b' ' {
                    self.window.mark();
                    self.response = (b'1'..=b'5').contains(&ch);
                    self.state = ParseState::Field1;
                } else if ch < b' ' {
                    return Err(HttpParseError::Framing("start line ended after one field"));
                }
            }

            ParseState::Field1 => {
                if ch == b' ' {
                    self.tok1 = self.window.range_from_mark();
                    self.state = ParseState::Space2;
                } else if ch == CR || ch == LF {
                    // end of line with no third field: HTTP/0.9 request
                    let target = self.window.range_from_mark();
                    return Ok(Some(self.finish_http09(target, ch, sink)?));
                } else if ch < b' ' {
                    return Err(HttpParseError::Framing("control byte in start line"));
                }
            }

            ParseState::Space2 => {
                if ch > b' ' {
                    self.window.mark();
                    self.state = ParseState::Field2;
                } else if ch == CR || ch == LF {
                    if self.response {
                        // status line without a reason phrase
                        self.emit_start(0..0, ch, sink)?;
                        return Ok(Some(ParseStep::Progress));
                    }
                    let target = self.tok1.clone();
                    return Ok(Some(self.finish_http09(target, ch, sink)?));
                } else if ch < b' ' {
                    return Err(HttpParseError::Framing("control byte in start line"));
                }
            }

            ParseState::Field2 => {
                if ch == CR || ch == LF {
                    let field2 = self.window.range_from_mark();
                    self.emit_start(field2, ch, sink)?;
                    return Ok(Some(ParseStep::Progress));
                } else if ch < b' ' && ch != b'\t' {
                    return Err(HttpParseError::Framing("control byte in start line"));
                }
            }

            ParseState::Header => {
                if ch == b':' || ch == b' ' || ch == b'\t' {
                    // value without a name: continuation of the previous line
                    self.tok_len = None;
                    self.state = ParseState::HeaderValue;
                } else if self.header_pending() {
                    // first byte of the next line finalizes the previous
                    // header; push the byte back so this step emits
                    // exactly one event
                    self.window.unget(1);
                    self.dispatch_header(sink)?;
                    return Ok(Some(ParseStep::Progress));
                } else if ch == CR || ch == LF {
                    return Ok(Some(self.finish_headers(ch, sink)?));
                } else {
                    self.window.mark();
                    self.tok_len = Some(1);
                    self.state = ParseState::HeaderName;
                }
            }

            ParseState::HeaderName => {
                if ch == CR || ch == LF {
                    if let Some(len) = self.tok_len
                        && len > 0
                    {
                        let mark = self.window.mark_index().unwrap_or_default();
                        self.tok0 = mark..mark + len;
                    }
                    self.eol = ch;
                    self.tok_len = None;
                    self.state = ParseState::Header;
                } else if ch == b':' {
                    if let Some(len) = self.tok_len
                        && len > 0
                    {
                        let mark = self.window.mark_index().unwrap_or_default();
                        self.tok0 = mark..mark + len;
                    }
                    self.tok_len = None;
                    self.state = ParseState::HeaderValue;
                } else if ch == b' ' || ch == b'\t' {
                    // ignored around the name
                } else if ch < b' ' {
                    return Err(HttpParseError::Framing("control byte in header name"));
                } else {
                    if self.tok_len.is_none() {
                        self.window.mark();
                    }
                    let mark = self.window.mark_index().unwrap_or_default();
                    self.tok_len = Some(self.window.get_index() - mark);
                }
            }

            ParseState::HeaderValue => {
                if ch == CR || ch == LF {
                    if let Some(len) = self.tok_len
                        && len > 0
                    {
                        let mark = self.window.mark_index().unwrap_or_default();
                        self.append_value_part(mark..mark + len);
                    }
                    self.eol = ch;
                    self.tok_len = None;
                    self.state = ParseState::Header;
                } else if ch == b' ' || ch == b'\t' {
                    // leading/trailing whitespace never extends the token
                } else if ch < b' ' {
                    return Err(HttpParseError::Framing("control byte in header value"));
                } else {
                    if self.tok_len.is_none() {
                        self.window.mark();
                    }
                    let mark = self.window.mark_index().unwrap_or_default();
                    self.tok_len = Some(self.window.get_index() - mark);
                }
            }

            _ => {}
        }
        Ok(None)
    }

    /// Record one physical line's worth of header value.
    ///
    /// The first line stays a zero-copy range; the moment a second line
    /// contributes, the value is copied into the owned accumulator with
    /// a single separating space, because the slice can no longer
    /// represent a non-contiguous value.
    fn append_value_part(&mut self, part: Range<usize>) {
        if self.tok1.is_empty() && self.folded.is_none() {
            self.tok1 = part;
            return;
        }
        if self.folded.is_none() {
            self.folded = Some(self.window.bytes(self.tok1.clone()).to_vec());
        }
        if let Some(acc) = self.folded.as_mut() {
            acc.push(b' ');
            acc.extend_from_slice(self.window.bytes(part.clone()));
        }
        self.tok1 = part;
    }

    fn header_pending(&self) -> bool {
        !self.tok0.is_empty() || !self.tok1.is_empty() || self.folded.is_some()
    }

    fn value_bytes(&self) -> &[u8] {
        match &self.folded {
            Some(acc) => acc,
            None => self.window.bytes(self.tok1.clone()),
        }
    }

    /// Emit the finalized header, applying framing semantics for
    /// recognized names first (skipped for trailers).
    fn dispatch_header<S>(&mut self, sink: &mut S) -> Result<(), HttpParseError>
    where
        S: EventSink + ?Sized,
    {
        if !self.trailers {
            self.apply_header_semantics()?;
        }
        let name = self.window.bytes(self.tok0.clone());
        let value = match &self.folded {
            Some(acc) => acc.as_slice(),
            None => self.window.bytes(self.tok1.clone()),
        };
        let emitted = sink.on_header(name, value);
        emitted?;
        self.tok0 = 0..0;
        self.tok1 = 0..0;
        self.tok_len = None;
        self.folded = None;
        Ok(())
    }

    fn apply_header_semantics(&mut self) -> Result<(), HttpParseError> {
        let Some(known) = KnownHeader::lookup(self.window.bytes(self.tok0.clone())) else {
            return Ok(());
        };
        match known {
            KnownHeader::ContentLength => {
                // chunked framing, once established, wins over any length
                if self.framing == ContentFraming::Chunked {
                    return Ok(());
                }
                let parsed = std::str::from_utf8(self.value_bytes())
                    .ok()
                    .and_then(|s| s.trim().parse::<u64>().ok());
                self.framing = match parsed {
                    Some(0) => ContentFraming::NoContent,
                    Some(n) => ContentFraming::Fixed(n),
                    None if self.config.lenient_content_length => ContentFraming::NoContent,
                    None => {
                        return Err(HttpParseError::Framing("invalid content-length value"));
                    }
                };
            }
            KnownHeader::TransferEncoding => {
                let lower = self.value_bytes().to_ascii_lowercase();
                if lower.ends_with(b"chunked") {
                    self.framing = ContentFraming::Chunked;
                } else if lower.len() >= 7 && lower.windows(7).any(|w| w == b"chunked") {
                    // dechunking would be ambiguous
                    return Err(HttpParseError::Framing(
                        "chunked must be the final transfer coding",
                    ));
                }
            }
            KnownHeader::ContentType => {
                self.has_content_hint = true;
            }
        }
        Ok(())
    }

    /// End of the header section (or of the trailer section).
    fn finish_headers<S>(&mut self, ch: u8, sink: &mut S) -> Result<ParseStep, HttpParseError>
    where
        S: EventSink + ?Sized,
    {
        self.eol = ch;

        if self.trailers {
            self.state = ParseState::End;
            sink.on_message_complete(self.content_pos)?;
            return Ok(ParseStep::MessageComplete);
        }

        if self.framing == ContentFraming::Unknown {
            self.framing = if self.has_content_hint || self.response {
                ContentFraming::EofDelimited
            } else {
                ContentFraming::NoContent
            };
        }
        self.content_pos = 0;

        match self.framing {
            ContentFraming::Unknown | ContentFraming::NoContent => {
                self.state = ParseState::End;
                sink.on_headers_complete()?;
                sink.on_message_complete(0)?;
                Ok(ParseStep::MessageComplete)
            }
            ContentFraming::Fixed(_) => {
                self.state = ParseState::Content;
                sink.on_headers_complete()?;
                Ok(ParseStep::Progress)
            }
            ContentFraming::EofDelimited => {
                self.state = ParseState::EofContent;
                sink.on_headers_complete()?;
                Ok(ParseStep::Progress)
            }
            ContentFraming::Chunked => {
                self.state = ParseState::Chunked;
                self.chunk.reset();
                sink.on_headers_complete()?;
                Ok(ParseStep::Progress)
            }
        }
    }

    /// Emit the start-line event for a full three-field line.
    fn emit_start<S>(
        &mut self,
        field2: Range<usize>,
        ch: u8,
        sink: &mut S,
    ) -> Result<(), HttpParseError>
    where
        S: EventSink + ?Sized,
    {
        let emitted = if self.response {
            let version = as_start_line_str(self.window.bytes(self.tok0.clone()))?;
            let status = as_start_line_str(self.window.bytes(self.tok1.clone()))?
                .parse::<u16>()
                .map_err(|_| HttpParseError::Framing("invalid status code"))?;
            let reason = as_start_line_str(self.window.bytes(field2))?;
            sink.on_response_start(version, status, reason)
        } else {
            let method = as_start_line_str(self.window.bytes(self.tok0.clone()))?;
            let target = as_start_line_str(self.window.bytes(self.tok1.clone()))?;
            let version = as_start_line_str(self.window.bytes(field2))?;
            sink.on_request_start(method, target, Some(version))
        };
        emitted?;
        self.eol = ch;
        self.state = ParseState::Header;
        self.clear_tokens();
        Ok(())
    }

    /// HTTP/0.9 simple request: start event, no headers, no body.
    fn finish_http09<S>(
        &mut self,
        target: Range<usize>,
        ch: u8,
        sink: &mut S,
    ) -> Result<ParseStep, HttpParseError>
    where
        S: EventSink + ?Sized,
    {
        let method = as_start_line_str(self.window.bytes(self.tok0.clone()))?;
        let uri = as_start_line_str(self.window.bytes(target))?;
        let emitted = sink.on_request_start(method, uri, None);
        emitted?;
        self.eol = ch;
        self.state = ParseState::End;
        self.clear_tokens();
        sink.on_headers_complete()?;
        sink.on_message_complete(0)?;
        Ok(ParseStep::MessageComplete)
    }

    fn clear_tokens(&mut self) {
        self.tok0 = 0..0;
        self.tok1 = 0..0;
        self.tok_len = None;
        self.folded = None;
        self.window.clear_mark();
    }

    // ========================================================================
    // Body
    // ========================================================================

    fn step_body<S>(&mut self, sink: &mut S) -> Result<Option<ParseStep>, HttpParseError>
    where
        S: EventSink + ?Sized,
    {
        match self.state {
            ParseState::EofContent => {
                self.eol = 0;
                let n = self.window.len();
                self.deliver(n, sink)?;
                Ok(Some(ParseStep::Progress))
            }

            ParseState::Content => {
                self.eol = 0;
                let ContentFraming::Fixed(total) = self.framing else {
                    return Err(HttpParseError::Framing("fixed-length framing lost"));
                };
                if self.content_pos == total {
                    self.state = ParseState::End;
                    sink.on_message_complete(self.content_pos)?;
                    return Ok(Some(ParseStep::MessageComplete));
                }
                let remaining = total - self.content_pos;
                let n = usize::try_from(remaining)
                    .map_or(self.window.len(), |r| r.min(self.window.len()));
                self.deliver(n, sink)?;
                Ok(Some(ParseStep::Progress))
            }

            ParseState::Chunked => {
                let Self {
                    window, chunk, eol, ..
                } = self;
                match chunk.step(window, eol)? {
                    ChunkStep::NeedData => Ok(None),
                    ChunkStep::Data(range) => {
                        let len = range.len() as u64;
                        let emitted = sink.on_body(self.content_pos, self.window.bytes(range));
                        emitted?;
                        self.content_pos += len;
                        Ok(Some(ParseStep::Progress))
                    }
                    ChunkStep::Trailers => {
                        self.trailers = true;
                        self.state = ParseState::Header;
                        Ok(Some(ParseStep::Progress))
                    }
                }
            }

            _ => Ok(None),
        }
    }

    /// Deliver `n` bytes from the window as one content event.
    fn deliver<S>(&mut self, n: usize, sink: &mut S) -> Result<(), HttpParseError>
    where
        S: EventSink + ?Sized,
    {
        let start = self.window.get_index();
        self.window.skip(n);
        let emitted = sink.on_body(self.content_pos, self.window.bytes(start..start + n));
        emitted?;
        self.content_pos += n as u64;
        Ok(())
    }

    /// Live token ranges forbid recycling the window.
    ///
    /// At the start of a header line with nothing pending the window can
    /// be cleared, so a trailer section reached after many windowfuls of
    /// body does not trip the capacity limit.
    fn tokens_live(&self) -> bool {
        match self.state {
            ParseState::Start => false,
            ParseState::Header => self.header_pending(),
            s => s.is_header_phase(),
        }
    }

    fn stream_closed<S>(&mut self, sink: &mut S) -> Result<ParseStep, HttpParseError>
    where
        S: EventSink + ?Sized,
    {
        match self.state {
            ParseState::EofContent => {
                self.state = ParseState::End;
                sink.on_message_complete(self.content_pos)?;
                Ok(ParseStep::MessageComplete)
            }
            ParseState::Start | ParseState::End => Ok(ParseStep::StreamClosed),
            _ => Err(HttpParseError::Truncated {
                received: self.content_pos,
            }),
        }
    }
}

fn as_start_line_str(bytes: &[u8]) -> Result<&str, HttpParseError> {
    std::str::from_utf8(bytes).map_err(|_| HttpParseError::Framing("invalid utf-8 in start line"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{HttpEvent, RecordingSink};
    use std::io;
    use wireline_io::MemoryEndpoint;

    fn parse_ok(input: &[u8]) -> Vec<HttpEvent> {
        let mut transport = MemoryEndpoint::with_input(input);
        let mut sink = RecordingSink::new();
        let mut parser = HttpParser::new();
        let step = parser.parse(&mut transport, &mut sink).expect("parse");
        assert_eq!(step, ParseStep::MessageComplete);
        sink.events
    }

    fn parse_err(input: &[u8]) -> HttpParseError {
        let mut transport = MemoryEndpoint::with_input(input);
        let mut sink = RecordingSink::new();
        let mut parser = HttpParser::new();
        parser
            .parse(&mut transport, &mut sink)
            .expect_err("expected parse failure")
    }

    fn request_start(method: &str, target: &str, version: &str) -> HttpEvent {
        HttpEvent::RequestStart {
            method: method.into(),
            target: target.into(),
            version: Some(version.into()),
        }
    }

    fn header(name: &str, value: &str) -> HttpEvent {
        HttpEvent::Header {
            name: name.as_bytes().to_vec(),
            value: value.as_bytes().to_vec(),
        }
    }

    // ========================================================================
    // Start line
    // ========================================================================

    #[test]
    fn simple_get_event_sequence() {
        let events = parse_ok(b"GET /x HTTP/1.1\r\nHost: a\r\n\r\n");
        assert_eq!(
            events,
            vec![
                request_start("GET", "/x", "HTTP/1.1"),
                header("Host", "a"),
                HttpEvent::HeadersComplete,
                HttpEvent::MessageComplete { total: 0 },
            ]
        );
    }

    #[test]
    fn bare_lf_line_endings_accepted() {
        let events = parse_ok(b"GET /x HTTP/1.1\nHost: a\n\n");
        assert_eq!(
            events,
            vec![
                request_start("GET", "/x", "HTTP/1.1"),
                header("Host", "a"),
                HttpEvent::HeadersComplete,
                HttpEvent::MessageComplete { total: 0 },
            ]
        );
    }

    #[test]
    fn leading_padding_before_start_line_skipped() {
        let events = parse_ok(b"\r\n\r\nGET / HTTP/1.1\r\n\r\n");
        assert_eq!(events[0], request_start("GET", "/", "HTTP/1.1"));
    }

    #[test]
    fn http09_request() {
        let events = parse_ok(b"GET /legacy\r\n");
        assert_eq!(
            events,
            vec![
                HttpEvent::RequestStart {
                    method: "GET".into(),
                    target: "/legacy".into(),
                    version: None,
                },
                HttpEvent::HeadersComplete,
                HttpEvent::MessageComplete { total: 0 },
            ]
        );
    }

    #[test]
    fn response_status_line() {
        let events = parse_ok(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n");
        assert_eq!(
            events[0],
            HttpEvent::ResponseStart {
                version: "HTTP/1.1".into(),
                status: 404,
                reason: "Not Found".into(),
            }
        );
    }

    #[test]
    fn response_without_reason_phrase() {
        let events = parse_ok(b"HTTP/1.1 204 \r\nContent-Length: 0\r\n\r\n");
        assert_eq!(
            events[0],
            HttpEvent::ResponseStart {
                version: "HTTP/1.1".into(),
                status: 204,
                reason: String::new(),
            }
        );
    }

    #[test]
    fn control_byte_in_start_line_rejected() {
        let err = parse_err(b"GE\x01T /x HTTP/1.1\r\n\r\n");
        assert!(matches!(err, HttpParseError::Framing(_)));
    }

    #[test]
    fn invalid_status_code_rejected() {
        let err = parse_err(b"HTTP/1.1 2x4 OK\r\n\r\n");
        assert!(matches!(err, HttpParseError::Framing(_)));
    }

    // ========================================================================
    // Headers
    // ========================================================================

    #[test]
    fn folded_continuation_yields_single_value() {
        let events = parse_ok(b"GET / HTTP/1.1\r\nX-Note: part1\r\n part2\r\n\r\n");
        assert!(events.contains(&header("X-Note", "part1 part2")));
    }

    #[test]
    fn folded_continuation_three_lines() {
        let events = parse_ok(b"GET / HTTP/1.1\r\nX-Note: a\r\n b\r\n\tc\r\n\r\n");
        assert!(events.contains(&header("X-Note", "a b c")));
    }

    #[test]
    fn header_value_whitespace_trimmed() {
        let events = parse_ok(b"GET / HTTP/1.1\r\nHost:   example.com  \r\n\r\n");
        assert!(events.contains(&header("Host", "example.com")));
    }

    #[test]
    fn header_without_value() {
        let events = parse_ok(b"GET / HTTP/1.1\r\nX-Empty:\r\n\r\n");
        assert!(events.contains(&header("X-Empty", "")));
    }

    #[test]
    fn control_byte_in_header_value_rejected() {
        let err = parse_err(b"GET / HTTP/1.1\r\nHost: a\x00b\r\n\r\n");
        assert!(matches!(err, HttpParseError::Framing(_)));
    }

    #[test]
    fn header_section_larger_than_window_is_limit_error() {
        let mut input = b"GET / HTTP/1.1\r\n".to_vec();
        input.extend_from_slice(b"X-Pad: ");
        input.extend(std::iter::repeat_n(b'a', 512));
        input.extend_from_slice(b"\r\n\r\n");

        let mut transport = MemoryEndpoint::with_input(&input);
        let mut sink = RecordingSink::new();
        let mut parser =
            HttpParser::with_config(ParserConfig::new().with_header_window_size(128));
        let err = parser
            .parse(&mut transport, &mut sink)
            .expect_err("window overflow");
        assert!(matches!(err, HttpParseError::LimitExceeded(_)));
    }

    // ========================================================================
    // Framing decisions
    // ========================================================================

    #[test]
    fn content_length_body() {
        let events = parse_ok(b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello");
        assert!(events.contains(&HttpEvent::Body {
            offset: 0,
            bytes: b"hello".to_vec(),
        }));
        assert_eq!(events.last(), Some(&HttpEvent::MessageComplete { total: 5 }));
    }

    #[test]
    fn content_length_zero_is_no_content() {
        let events = parse_ok(b"POST / HTTP/1.1\r\nContent-Length: 0\r\n\r\n");
        assert_eq!(events.last(), Some(&HttpEvent::MessageComplete { total: 0 }));
        assert!(!events.iter().any(|e| matches!(e, HttpEvent::Body { .. })));
    }

    #[test]
    fn absent_length_without_hint_is_no_content() {
        let events = parse_ok(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n");
        assert_eq!(events.last(), Some(&HttpEvent::MessageComplete { total: 0 }));
    }

    #[test]
    fn content_type_hint_makes_request_eof_delimited() {
        let input = b"POST / HTTP/1.1\r\nContent-Type: text/plain\r\n\r\nrest of stream";
        let events = parse_ok(input);
        assert_eq!(
            events.last(),
            Some(&HttpEvent::MessageComplete { total: 14 })
        );
        assert!(events.contains(&HttpEvent::Body {
            offset: 0,
            bytes: b"rest of stream".to_vec(),
        }));
    }

    #[test]
    fn response_without_length_is_eof_delimited() {
        let events = parse_ok(b"HTTP/1.0 200 OK\r\nServer: x\r\n\r\nbody until close");
        assert_eq!(
            events.last(),
            Some(&HttpEvent::MessageComplete { total: 16 })
        );
    }

    #[test]
    fn malformed_content_length_rejected_by_default() {
        let err = parse_err(b"POST / HTTP/1.1\r\nContent-Length: abc\r\n\r\n");
        assert!(matches!(err, HttpParseError::Framing(_)));
    }

    #[test]
    fn malformed_content_length_coerced_when_lenient() {
        let mut transport =
            MemoryEndpoint::with_input(b"POST / HTTP/1.1\r\nContent-Length: -5\r\n\r\n");
        let mut sink = RecordingSink::new();
        let mut parser =
            HttpParser::with_config(ParserConfig::new().with_lenient_content_length(true));
        let step = parser.parse(&mut transport, &mut sink).expect("lenient");
        assert_eq!(step, ParseStep::MessageComplete);
        assert_eq!(
            sink.events.last(),
            Some(&HttpEvent::MessageComplete { total: 0 })
        );
    }

    #[test]
    fn chunked_wins_over_content_length_either_order() {
        for input in [
            b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\nContent-Length: 999\r\n\r\n0\r\n\r\n"
                .as_slice(),
            b"POST / HTTP/1.1\r\nContent-Length: 999\r\nTransfer-Encoding: chunked\r\n\r\n0\r\n\r\n"
                .as_slice(),
        ] {
            let events = parse_ok(input);
            assert_eq!(events.last(), Some(&HttpEvent::MessageComplete { total: 0 }));
        }
    }

    #[test]
    fn chunked_not_final_coding_rejected() {
        let err = parse_err(b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked, gzip\r\n\r\n");
        assert!(matches!(
            err,
            HttpParseError::Framing("chunked must be the final transfer coding")
        ));
    }

    #[test]
    fn chunked_as_final_coding_accepted() {
        let events = parse_ok(
            b"POST / HTTP/1.1\r\nTransfer-Encoding: gzip, chunked\r\n\r\n3\r\nabc\r\n0\r\n\r\n",
        );
        assert_eq!(events.last(), Some(&HttpEvent::MessageComplete { total: 3 }));
    }

    // ========================================================================
    // Chunked bodies
    // ========================================================================

    #[test]
    fn chunked_response_event_sequence() {
        let input = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nabcd\r\n0\r\n\r\n";
        let events = parse_ok(input);
        assert_eq!(
            events,
            vec![
                HttpEvent::ResponseStart {
                    version: "HTTP/1.1".into(),
                    status: 200,
                    reason: "OK".into(),
                },
                header("Transfer-Encoding", "chunked"),
                HttpEvent::HeadersComplete,
                HttpEvent::Body {
                    offset: 0,
                    bytes: b"abcd".to_vec(),
                },
                HttpEvent::MessageComplete { total: 4 },
            ]
        );
    }

    #[test]
    fn chunked_round_trip_with_trailers() {
        let input = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n\
                      3\r\nfoo\r\n3\r\nbar\r\n0\r\nX-Check: sum\r\n\r\n";
        let mut transport = MemoryEndpoint::with_input(input);
        let mut sink = RecordingSink::new();
        let mut parser = HttpParser::new();
        parser.parse(&mut transport, &mut sink).expect("parse");

        assert_eq!(sink.body(), b"foobar");
        assert_eq!(
            sink.events.last(),
            Some(&HttpEvent::MessageComplete { total: 6 })
        );
        // trailer delivered after the body
        let trailer_at = sink
            .events
            .iter()
            .position(|e| *e == header("X-Check", "sum"))
            .expect("trailer event");
        let body_at = sink
            .events
            .iter()
            .position(|e| matches!(e, HttpEvent::Body { .. }))
            .expect("body event");
        assert!(trailer_at > body_at);
    }

    #[test]
    fn chunk_extensions_ignored() {
        let input =
            b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n4;x=y\r\nabcd\r\n0\r\n\r\n";
        let mut transport = MemoryEndpoint::with_input(input);
        let mut sink = RecordingSink::new();
        let mut parser = HttpParser::new();
        parser.parse(&mut transport, &mut sink).expect("parse");
        assert_eq!(sink.body(), b"abcd");
    }

    #[test]
    fn bad_chunk_size_byte_fails_parse() {
        let err = parse_err(b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\n");
        assert!(matches!(err, HttpParseError::Framing(_)));
    }

    // ========================================================================
    // Stepping, lifecycle, failure
    // ========================================================================

    #[test]
    fn need_input_on_idle_transport() {
        let mut transport = MemoryEndpoint::new();
        transport.push_input(b"GET / HT");
        let mut sink = RecordingSink::new();
        let mut parser = HttpParser::new();

        let mut step = parser.parse_next(&mut transport, &mut sink).unwrap();
        while step == ParseStep::Progress {
            step = parser.parse_next(&mut transport, &mut sink).unwrap();
        }
        assert_eq!(step, ParseStep::NeedInput);

        transport.push_input(b"TP/1.1\r\n\r\n");
        let mut last = ParseStep::Progress;
        while last == ParseStep::Progress {
            last = parser.parse_next(&mut transport, &mut sink).unwrap();
        }
        assert_eq!(last, ParseStep::MessageComplete);
        assert_eq!(sink.events[0], request_start("GET", "/", "HTTP/1.1"));
    }

    #[test]
    fn pipelined_messages_parse_after_reset() {
        let input = b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n";
        let mut transport = MemoryEndpoint::with_input(input);
        let mut sink = RecordingSink::new();
        let mut parser = HttpParser::new();

        parser.parse(&mut transport, &mut sink).expect("first");
        parser.reset();
        parser.parse(&mut transport, &mut sink).expect("second");

        let starts: Vec<_> = sink
            .events
            .iter()
            .filter_map(|e| match e {
                HttpEvent::RequestStart { target, .. } => Some(target.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(starts, vec!["/a".to_string(), "/b".to_string()]);
    }

    #[test]
    fn parse_available_drains_buffered_bytes_and_tracks_phase() {
        let mut transport = MemoryEndpoint::new();
        transport.push_input(b"POST /a HTTP/1.1\r\nContent-Length: 6\r\n\r\nabc");
        let mut sink = RecordingSink::new();
        let mut parser = HttpParser::new();

        assert!(parser.in_header_phase());
        assert_eq!(parser.framing(), ContentFraming::Unknown);

        // stalls mid-body once the buffered bytes run out
        let step = parser.parse_available(&mut transport, &mut sink).unwrap();
        assert_eq!(step, ParseStep::Progress);
        assert!(parser.in_body_phase());
        assert!(!parser.in_header_phase());
        assert_eq!(parser.framing(), ContentFraming::Fixed(6));
        assert_eq!(parser.content_position(), 3);
        assert!(!parser.is_response());
        assert!(!parser.is_complete());

        transport.push_input(b"def");
        let step = parser.parse_available(&mut transport, &mut sink).unwrap();
        assert_eq!(step, ParseStep::Progress);
        assert_eq!(parser.content_position(), 6);
        assert_eq!(sink.body(), b"abcdef");

        // completion needs no further input
        let step = parser.parse_available(&mut transport, &mut sink).unwrap();
        assert_eq!(step, ParseStep::MessageComplete);
        assert!(parser.is_complete());
        assert!(!parser.in_body_phase());
    }

    #[test]
    fn parse_available_stops_at_pipelined_message_boundary() {
        let input = b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n";
        let mut transport = MemoryEndpoint::with_input(input);
        let mut sink = RecordingSink::new();
        let mut parser = HttpParser::new();

        let step = parser.parse_available(&mut transport, &mut sink).unwrap();
        assert_eq!(step, ParseStep::MessageComplete);
        assert_eq!(parser.framing(), ContentFraming::NoContent);
        assert!(parser.is_complete());

        // the second request is already buffered behind the boundary
        parser.reset();
        assert!(!parser.is_complete());
        let step = parser.parse_available(&mut transport, &mut sink).unwrap();
        assert_eq!(step, ParseStep::MessageComplete);

        let starts: Vec<_> = sink
            .events
            .iter()
            .filter_map(|e| match e {
                HttpEvent::RequestStart { target, .. } => Some(target.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(starts, vec!["/a".to_string(), "/b".to_string()]);
    }

    #[test]
    fn response_accessors_track_eof_delimited_body() {
        let mut transport = MemoryEndpoint::new();
        transport.push_input(b"HTTP/1.1 200 OK\r\n\r\npartial");
        let mut sink = RecordingSink::new();
        let mut parser = HttpParser::new();

        let step = parser.parse_available(&mut transport, &mut sink).unwrap();
        assert_eq!(step, ParseStep::Progress);
        assert!(parser.is_response());
        assert_eq!(parser.framing(), ContentFraming::EofDelimited);
        assert!(parser.in_body_phase());
        assert_eq!(parser.content_position(), 7);
        assert!(!parser.is_complete());

        transport.finish_input();
        let step = parser.parse_available(&mut transport, &mut sink).unwrap();
        assert_eq!(step, ParseStep::MessageComplete);
        assert!(parser.is_complete());
        assert_eq!(parser.content_position(), 7);
    }

    #[test]
    fn clean_eof_between_messages_is_stream_closed() {
        let mut transport = MemoryEndpoint::with_input(b"");
        let mut sink = RecordingSink::new();
        let mut parser = HttpParser::new();
        let step = parser.parse(&mut transport, &mut sink).expect("eof");
        assert_eq!(step, ParseStep::StreamClosed);
    }

    #[test]
    fn eof_mid_message_is_truncation() {
        let err = parse_err(b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc");
        assert!(matches!(err, HttpParseError::Truncated { received: 3 }));
    }

    #[test]
    fn parser_failure_is_sticky() {
        let mut transport = MemoryEndpoint::with_input(b"HTTP/1.1 2x4 OK\r\n\r\n");
        let mut sink = RecordingSink::new();
        let mut parser = HttpParser::new();
        assert!(parser.parse(&mut transport, &mut sink).is_err());
        assert_eq!(parser.state(), ParseState::Failed);

        let again = parser.parse_next(&mut transport, &mut sink).unwrap_err();
        assert!(matches!(again, HttpParseError::Failed));
    }

    #[test]
    fn sink_error_aborts_parsing() {
        struct FailingSink;
        impl EventSink for FailingSink {
            fn on_headers_complete(&mut self) -> io::Result<()> {
                Err(io::Error::other("sink rejected"))
            }
        }

        let mut transport = MemoryEndpoint::with_input(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n");
        let mut parser = HttpParser::new();
        let err = parser
            .parse(&mut transport, &mut FailingSink)
            .expect_err("sink failure");
        assert!(matches!(err, HttpParseError::Transport(_)));
        assert_eq!(parser.state(), ParseState::Failed);
    }

    #[test]
    fn fixed_body_split_across_reads_accumulates_offsets() {
        let mut transport = MemoryEndpoint::new();
        transport.push_input(b"POST / HTTP/1.1\r\nContent-Length: 6\r\n\r\nabc");
        let mut sink = RecordingSink::new();
        let mut parser = HttpParser::new();

        let mut step = parser.parse_next(&mut transport, &mut sink).unwrap();
        while step == ParseStep::Progress {
            step = parser.parse_next(&mut transport, &mut sink).unwrap();
        }
        assert_eq!(step, ParseStep::NeedInput);

        transport.push_input(b"def");
        let mut last = ParseStep::Progress;
        while last == ParseStep::Progress {
            last = parser.parse_next(&mut transport, &mut sink).unwrap();
        }
        assert_eq!(last, ParseStep::MessageComplete);

        let bodies: Vec<_> = sink
            .events
            .iter()
            .filter_map(|e| match e {
                HttpEvent::Body { offset, bytes } => Some((*offset, bytes.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(
            bodies,
            vec![(0, b"abc".to_vec()), (3, b"def".to_vec())]
        );
    }

    #[test]
    fn body_larger_than_window_cycles_through() {
        let mut payload = Vec::new();
        payload.extend(std::iter::repeat_n(b'x', 300));
        let mut input = format!("POST / HTTP/1.1\r\nContent-Length: {}\r\n\r\n", payload.len())
            .into_bytes();
        input.extend_from_slice(&payload);

        let mut transport = MemoryEndpoint::with_input(&input);
        let mut sink = RecordingSink::new();
        let mut parser =
            HttpParser::with_config(ParserConfig::new().with_header_window_size(128));
        parser.parse(&mut transport, &mut sink).expect("parse");
        assert_eq!(sink.body(), payload);
    }
}
