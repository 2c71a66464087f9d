//! Chunked transfer-coding decoder.
//!
//! Sub-state machine of the parser for `Transfer-Encoding: chunked`
//! bodies. It is kept separate from header parsing because its failure
//! modes differ: a bad byte in a chunk-size line poisons the framing of
//! everything after it, so all chunk syntax errors are fatal.
//!
//! Chunk format:
//! ```text
//! chunk-size [;extensions] CRLF
//! chunk-data CRLF
//! ...
//! 0 CRLF
//! [trailers] CRLF
//! ```
//!
//! Extensions are lexically consumed and semantically ignored. The
//! trailer section itself is parsed by the caller with its header-line
//! logic; the decoder only reports when the zero-length chunk has been
//! seen.

use std::ops::Range;

use wireline_io::ByteWindow;

use crate::error::HttpParseError;

const CR: u8 = b'\r';
const LF: u8 = b'\n';

/// Position within the current chunk.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkCursor {
    len: u64,
    pos: u64,
}

impl ChunkCursor {
    /// Bytes of the current chunk not yet delivered.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.len - self.pos
    }

    /// Declared length of the current chunk.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true if no chunk is in progress.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn push_hex_digit(&mut self, digit: u8) -> Result<(), HttpParseError> {
        self.len = self
            .len
            .checked_mul(16)
            .and_then(|v| v.checked_add(u64::from(digit)))
            .ok_or(HttpParseError::Framing("chunk size overflow"))?;
        Ok(())
    }

    fn advance(&mut self, n: u64) {
        self.pos += n;
    }

    fn reset(&mut self) {
        self.len = 0;
        self.pos = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    /// Between chunks; skipping the terminator of the previous one.
    Boundary,
    /// Accumulating the hex chunk-size.
    Size,
    /// Consuming chunk extensions after `;`.
    Params,
    /// Delivering chunk data.
    Data,
}

/// One decoding advance.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ChunkStep {
    /// The window drained mid-framing; refill and step again.
    NeedData,
    /// Chunk data was consumed from the window; deliver these bytes.
    Data(Range<usize>),
    /// The zero-length chunk was read; the trailer section follows.
    Trailers,
}

/// Decoder for chunk-size/extension/data framing.
#[derive(Debug)]
pub struct ChunkDecoder {
    state: ChunkState,
    cursor: ChunkCursor,
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkDecoder {
    /// Create a decoder positioned before the first chunk.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ChunkState::Boundary,
            cursor: ChunkCursor::default(),
        }
    }

    /// Position within the current chunk.
    #[must_use]
    pub fn cursor(&self) -> ChunkCursor {
        self.cursor
    }

    /// Return to the pre-first-chunk state.
    pub fn reset(&mut self) {
        self.state = ChunkState::Boundary;
        self.cursor.reset();
    }

    /// Advance the decoder over the window's readable bytes.
    ///
    /// `eol` is the parser's remembered line terminator, shared so a CRLF
    /// pair split between header and chunk states is absorbed exactly
    /// once.
    pub(crate) fn step(
        &mut self,
        window: &mut ByteWindow,
        eol: &mut u8,
    ) -> Result<ChunkStep, HttpParseError> {
        loop {
            let Some(ch) = window.peek() else {
                return Ok(ChunkStep::NeedData);
            };
            if *eol == CR && ch == LF {
                window.take();
                *eol = LF;
                continue;
            }
            *eol = 0;

            match self.state {
                ChunkState::Boundary => {
                    if ch == CR || ch == LF {
                        window.take();
                        *eol = ch;
                    } else if ch <= b' ' {
                        // stray padding between chunks
                        window.take();
                    } else {
                        self.cursor.reset();
                        self.state = ChunkState::Size;
                    }
                }

                ChunkState::Size => {
                    window.take();
                    if ch == CR || ch == LF {
                        *eol = ch;
                        if self.cursor.is_empty() {
                            self.state = ChunkState::Boundary;
                            return Ok(ChunkStep::Trailers);
                        }
                        self.state = ChunkState::Data;
                    } else if ch == b';' || ch <= b' ' {
                        self.state = ChunkState::Params;
                    } else if let Some(digit) = hex_digit(ch) {
                        self.cursor.push_hex_digit(digit)?;
                    } else {
                        return Err(HttpParseError::Framing("invalid chunk size character"));
                    }
                }

                ChunkState::Params => {
                    // Extensions carry no meaning here; skip to the terminator.
                    match window.find2(CR, LF) {
                        Some(at) => {
                            window.skip(at);
                            let term = window.take().unwrap_or(LF);
                            *eol = term;
                            if self.cursor.is_empty() {
                                self.state = ChunkState::Boundary;
                                return Ok(ChunkStep::Trailers);
                            }
                            self.state = ChunkState::Data;
                        }
                        None => {
                            window.skip(window.len());
                            return Ok(ChunkStep::NeedData);
                        }
                    }
                }

                ChunkState::Data => {
                    let remaining = self.cursor.remaining();
                    if remaining == 0 {
                        self.state = ChunkState::Boundary;
                        continue;
                    }
                    let n = u64::try_from(window.len())
                        .map(|len| len.min(remaining))
                        .unwrap_or(remaining);
                    #[allow(clippy::cast_possible_truncation)]
                    let n = n as usize;
                    let start = window.get_index();
                    window.skip(n);
                    self.cursor.advance(n as u64);
                    return Ok(ChunkStep::Data(start..start + n));
                }
            }
        }
    }
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
