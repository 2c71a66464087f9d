//! In-memory endpoints.
//!
//! [`MemoryEndpoint`] is a loopback transport: bytes queued with
//! [`push_input`][MemoryEndpoint::push_input] come back out of `fill`,
//! and everything flushed is captured for inspection. Tests use it as a
//! stand-in for a socket.
//!
//! [`ScriptedEndpoint`] replays a byte stream in caller-chosen segment
//! sizes, one segment per `fill` call, to simulate arbitrary partial
//! socket reads.

use std::collections::VecDeque;

use crate::transport::{FillOutcome, Transport, TransportError};
use crate::window::ByteWindow;

/// Loopback transport backed by in-memory queues.
#[derive(Debug, Default)]
pub struct MemoryEndpoint {
    input: VecDeque<u8>,
    written: Vec<u8>,
    eof: bool,
    closed: bool,
    /// Cap on bytes accepted per flush call; `None` means unlimited.
    max_write: Option<usize>,
    /// Depletable total write allowance; at zero, flushes would-block.
    write_budget: Option<usize>,
}

impl MemoryEndpoint {
    /// Create an empty endpoint.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an endpoint whose input stream is `input`, followed by EOF.
    #[must_use]
    pub fn with_input(input: &[u8]) -> Self {
        let mut ep = Self::new();
        ep.push_input(input);
        ep.finish_input();
        ep
    }

    /// Queue bytes to be produced by subsequent `fill` calls.
    pub fn push_input(&mut self, bytes: &[u8]) {
        self.input.extend(bytes);
    }

    /// Mark the input stream as finished; once drained, `fill` reports EOF.
    pub fn finish_input(&mut self) {
        self.eof = true;
    }

    /// Limit how many bytes each flush call will accept.
    pub fn set_max_write(&mut self, limit: usize) {
        self.max_write = Some(limit);
    }

    /// Give the endpoint a total write allowance; once spent, flushes
    /// accept zero bytes until more is granted.
    pub fn set_write_budget(&mut self, budget: usize) {
        self.write_budget = Some(budget);
    }

    /// Grant additional write allowance.
    pub fn add_write_budget(&mut self, extra: usize) {
        self.write_budget = Some(self.write_budget.unwrap_or(0) + extra);
    }

    /// Everything flushed so far.
    #[must_use]
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Drain and return everything flushed so far.
    pub fn take_written(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.written)
    }
}

impl Transport for MemoryEndpoint {
    fn fill(&mut self, window: &mut ByteWindow) -> Result<FillOutcome, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if self.input.is_empty() {
            return Ok(if self.eof {
                FillOutcome::Eof
            } else {
                FillOutcome::Idle
            });
        }
        let n = window.space().min(self.input.len());
        if n == 0 {
            return Ok(FillOutcome::Idle);
        }
        for _ in 0..n {
            let b = self.input.pop_front().unwrap_or_default();
            window.put_slice(&[b]);
        }
        Ok(FillOutcome::Read(n))
    }

    fn flush(&mut self, window: &mut ByteWindow) -> Result<usize, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let mut n = window.len();
        if let Some(limit) = self.max_write {
            n = n.min(limit);
        }
        if let Some(budget) = self.write_budget {
            n = n.min(budget);
            self.write_budget = Some(budget - n);
        }
        self.written.extend_from_slice(&window.as_slice()[..n]);
        window.skip(n);
        Ok(n)
    }

    fn is_open(&self) -> bool {
        !self.closed
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        Ok(())
    }
}

/// Replays an input stream one pre-cut segment per `fill` call.
///
/// An empty segment yields [`FillOutcome::Idle`], so stalls can be
/// scripted too. After the last segment the endpoint reports EOF.
#[derive(Debug)]
pub struct ScriptedEndpoint {
    segments: VecDeque<Vec<u8>>,
    written: Vec<u8>,
    closed: bool,
}

impl ScriptedEndpoint {
    /// Split `input` at the given cut offsets (ascending, in-range).
    #[must_use]
    pub fn segmented(input: &[u8], cuts: &[usize]) -> Self {
        let mut segments = VecDeque::new();
        let mut start = 0;
        for &cut in cuts {
            let cut = cut.min(input.len());
            if cut > start {
                segments.push_back(input[start..cut].to_vec());
                start = cut;
            }
        }
        if start < input.len() {
            segments.push_back(input[start..].to_vec());
        }
        Self {
            segments,
            written: Vec::new(),
            closed: false,
        }
    }

    /// Use the given segments verbatim.
    #[must_use]
    pub fn from_segments(segments: Vec<Vec<u8>>) -> Self {
        Self {
            segments: segments.into(),
            written: Vec::new(),
            closed: false,
        }
    }

    /// Everything flushed so far.
    #[must_use]
    pub fn written(&self) -> &[u8] {
        &self.written
    }
}

impl Transport for ScriptedEndpoint {
    fn fill(&mut self, window: &mut ByteWindow) -> Result<FillOutcome, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let Some(front) = self.segments.front_mut() else {
            return Ok(FillOutcome::Eof);
        };
        if front.is_empty() {
            self.segments.pop_front();
            return Ok(FillOutcome::Idle);
        }
        let n = window.put_slice(front);
        front.drain(..n);
        if front.is_empty() {
            self.segments.pop_front();
        }
        if n == 0 {
            Ok(FillOutcome::Idle)
        } else {
            Ok(FillOutcome::Read(n))
        }
    }

    fn flush(&mut self, window: &mut ByteWindow) -> Result<usize, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let n = window.len();
        self.written.extend_from_slice(window.as_slice());
        window.skip(n);
        Ok(n)
    }

    fn is_open(&self) -> bool {
        !self.closed
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        Ok(())
    }
}
