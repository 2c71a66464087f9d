//! Byte window with read/write cursors and a token mark.
//!
//! A [`ByteWindow`] is the buffer shape shared by the parser and the TLS
//! endpoint: a contiguous region with a `get` (read) cursor, a `put`
//! (write) cursor, and an optional mark used to delimit in-place tokens.
//!
//! # Zero-Copy Tokens
//!
//! Callers remember absolute index ranges into the window and resolve
//! them with [`bytes`][ByteWindow::bytes]. Such ranges stay valid only
//! until the window is compacted or cleared; code that must keep a value
//! across a compaction copies it out first.

use std::ops::Range;

/// A growable byte region with read cursor, write cursor, and mark.
///
/// Invariant: `get <= put <= capacity`. The readable region is
/// `[get, put)`; the writable region is `[put, capacity)`.
#[derive(Debug)]
pub struct ByteWindow {
    buf: Vec<u8>,
    get: usize,
    put: usize,
    mark: Option<usize>,
}

impl ByteWindow {
    /// Create a window with the given capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity],
            get: 0,
            put: 0,
            mark: None,
        }
    }

    /// Returns the total capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Returns the number of readable bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.put - self.get
    }

    /// Returns true if no bytes are readable.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.get == self.put
    }

    /// Returns the number of writable bytes remaining.
    #[must_use]
    pub fn space(&self) -> usize {
        self.buf.len() - self.put
    }

    /// Returns the read cursor position.
    #[must_use]
    pub fn get_index(&self) -> usize {
        self.get
    }

    /// Returns the write cursor position.
    #[must_use]
    pub fn put_index(&self) -> usize {
        self.put
    }

    /// Discard all content and reset both cursors.
    pub fn clear(&mut self) {
        self.get = 0;
        self.put = 0;
        self.mark = None;
    }

    /// Move the readable region to the front of the buffer.
    ///
    /// Invalidates the mark and any absolute index ranges held by the
    /// caller.
    pub fn compact(&mut self) {
        if self.get > 0 {
            self.buf.copy_within(self.get..self.put, 0);
            self.put -= self.get;
            self.get = 0;
        }
        self.mark = None;
    }

    /// Grow the buffer by at least `additional` bytes of write space.
    pub fn grow(&mut self, additional: usize) {
        let new_len = (self.buf.len() * 2).max(self.put + additional);
        self.buf.resize(new_len, 0);
    }

    // ========================================================================
    // Read side
    // ========================================================================

    /// Peek at the next readable byte without consuming it.
    #[must_use]
    pub fn peek(&self) -> Option<u8> {
        if self.is_empty() {
            None
        } else {
            Some(self.buf[self.get])
        }
    }

    /// Consume and return the next readable byte.
    pub fn take(&mut self) -> Option<u8> {
        if self.is_empty() {
            None
        } else {
            let b = self.buf[self.get];
            self.get += 1;
            Some(b)
        }
    }

    /// Push back the most recently consumed bytes.
    ///
    /// The bytes are still in the buffer; this only rewinds the read
    /// cursor.
    pub fn unget(&mut self, n: usize) {
        debug_assert!(n <= self.get);
        self.get -= n.min(self.get);
    }

    /// Advance the read cursor by up to `n` bytes, returning the count
    /// actually skipped.
    pub fn skip(&mut self, n: usize) -> usize {
        let n = n.min(self.len());
        self.get += n;
        n
    }

    /// Consume up to `n` bytes and return them as a slice.
    pub fn take_slice(&mut self, n: usize) -> &[u8] {
        let n = n.min(self.len());
        let start = self.get;
        self.get += n;
        &self.buf[start..start + n]
    }

    /// Returns the readable region without consuming it.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[self.get..self.put]
    }

    /// Resolve an absolute index range into a slice.
    #[must_use]
    pub fn bytes(&self, range: Range<usize>) -> &[u8] {
        &self.buf[range]
    }

    /// Offset of the first occurrence of `a` or `b` in the readable
    /// region, relative to the read cursor.
    #[must_use]
    pub fn find2(&self, a: u8, b: u8) -> Option<usize> {
        memchr::memchr2(a, b, self.as_slice())
    }

    // ========================================================================
    // Mark
    // ========================================================================

    /// Mark the most recently consumed byte as the start of a token.
    pub fn mark(&mut self) {
        debug_assert!(self.get > 0);
        self.mark = Some(self.get - 1);
    }

    /// Returns the marked index, if any.
    #[must_use]
    pub fn mark_index(&self) -> Option<usize> {
        self.mark
    }

    /// Forget the mark.
    pub fn clear_mark(&mut self) {
        self.mark = None;
    }

    /// The token from the mark up to (but excluding) the most recently
    /// consumed byte.
    #[must_use]
    pub fn range_from_mark(&self) -> Range<usize> {
        let start = self.mark.unwrap_or(self.get);
        start..self.get.saturating_sub(1).max(start)
    }

    // ========================================================================
    // Write side
    // ========================================================================

    /// Copy as much of `src` as fits, returning the count written.
    pub fn put_slice(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.space());
        self.buf[self.put..self.put + n].copy_from_slice(&src[..n]);
        self.put += n;
        n
    }

    /// The writable tail of the buffer, for transports to fill directly.
    pub fn unfilled(&mut self) -> &mut [u8] {
        &mut self.buf[self.put..]
    }

    /// Commit `n` bytes written into [`unfilled`][Self::unfilled].
    pub fn advance_put(&mut self, n: usize) {
        debug_assert!(n <= self.space());
        self.put += n.min(self.space());
    }
}
