//! TLS-terminating endpoint.
//!
//! [`TlsEndpoint`] wraps a plaintext-oblivious [`Transport`] and a
//! [`TlsEngine`], presenting a plaintext [`Transport`] to the layer
//! above. It owns two record windows: inbound wire bytes waiting to be
//! unwrapped, and the current outbound record waiting to be flushed.
//!
//! # Record Ordering
//!
//! A wrapped record is committed: its plaintext has been consumed by the
//! engine and can only ever reach the peer as that record. The endpoint
//! therefore refuses to wrap new plaintext while any part of a previous
//! record is still buffered; [`flush_regions`] drains first and reports
//! zero consumed if the transport cannot take the rest yet.
//!
//! [`flush_regions`]: TlsEndpoint::flush_regions

use wireline_io::{ByteWindow, FillOutcome, Transport, TransportError};

use crate::engine::{EngineStatus, HandshakeStatus, TlsEngine};

/// Plaintext transport over a TLS engine and a wire transport.
#[derive(Debug)]
pub struct TlsEndpoint<T, E> {
    transport: T,
    engine: E,
    /// Wire records read from the transport, not yet unwrapped.
    in_records: ByteWindow,
    /// The wrapped record currently being flushed to the transport.
    out_records: ByteWindow,
    /// Run delegated handshake tasks on the calling thread. When false,
    /// fill and flush park on `NeedTask` and the caller drains tasks
    /// through [`TlsEndpoint::next_delegated_task`].
    inline_tasks: bool,
}

impl<T: Transport, E: TlsEngine> TlsEndpoint<T, E> {
    /// Wrap a transport with the given engine.
    pub fn new(transport: T, engine: E) -> Self {
        let record_size = engine.max_record_size();
        Self {
            transport,
            engine,
            in_records: ByteWindow::with_capacity(record_size),
            out_records: ByteWindow::with_capacity(record_size),
            inline_tasks: true,
        }
    }

    /// Hand delegated handshake tasks to the caller instead of running
    /// them inline. While a task is pending, `fill` reports idle and
    /// flushes accept nothing; progress resumes once the caller has run
    /// every task from [`next_delegated_task`][Self::next_delegated_task].
    #[must_use]
    pub fn with_external_tasks(mut self) -> Self {
        self.inline_tasks = false;
        self
    }

    /// Pull the next pending handshake task for external execution.
    pub fn next_delegated_task(&mut self) -> Option<Box<dyn FnOnce() + Send>> {
        self.engine.delegated_task()
    }

    /// The engine, for handshake inspection.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The underlying transport, mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Returns true if undecrypted wire bytes are buffered; the layer
    /// above should keep filling even if the socket goes quiet.
    #[must_use]
    pub fn is_buffering_input(&self) -> bool {
        !self.in_records.is_empty()
    }

    /// Returns true if part of a wrapped record still awaits the
    /// transport; new plaintext will not be accepted until it drains.
    #[must_use]
    pub fn is_buffering_output(&self) -> bool {
        !self.out_records.is_empty()
    }

    /// Give back the transport and engine.
    pub fn into_parts(self) -> (T, E) {
        (self.transport, self.engine)
    }

    /// Flush up to three plaintext regions as a single gathered record.
    ///
    /// Regions are consumed in order (header, then body, then trailer)
    /// and the return value is the total plaintext consumed, so a caller
    /// holding a response head and payload in separate buffers can
    /// attribute partial progress. Returns zero without consuming
    /// anything while a previous record is still draining.
    pub fn flush_regions(
        &mut self,
        header: &[u8],
        body: &[u8],
        trailer: &[u8],
    ) -> Result<usize, TransportError> {
        if !self.drain_out_records()? {
            return Ok(0);
        }
        loop {
            match self.engine.handshake_status() {
                HandshakeStatus::NeedTask => {
                    if !self.inline_tasks {
                        return Ok(0);
                    }
                    self.run_delegated_tasks();
                    continue;
                }
                HandshakeStatus::NeedUnwrap => {
                    // the engine is waiting on peer records; only a fill
                    // can make progress
                    return Ok(0);
                }
                HandshakeStatus::NeedWrap
                | HandshakeStatus::NotHandshaking
                | HandshakeStatus::Finished => {}
            }

            if header.is_empty()
                && body.is_empty()
                && trailer.is_empty()
                && self.engine.handshake_status() != HandshakeStatus::NeedWrap
            {
                return Ok(0);
            }

            let result = self.engine.wrap(&[header, body, trailer], &mut self.out_records)?;
            match result.status {
                EngineStatus::Closed => {
                    return Err(TransportError::Protocol("tls engine closed"));
                }
                EngineStatus::BufferOverflow => {
                    tracing::debug!("record window full during wrap, growing");
                    self.out_records.grow(self.engine.max_record_size());
                }
                EngineStatus::BufferUnderflow => {
                    tracing::debug!("engine wants more plaintext before wrapping");
                    return Ok(0);
                }
                EngineStatus::Ok => {
                    self.drain_out_records()?;
                    if result.consumed > 0 || result.produced == 0 {
                        return Ok(result.consumed);
                    }
                    // a handshake record went out; wrap again for the
                    // application data
                }
            }
        }
    }

    /// Push close records out best-effort and close the transport.
    ///
    /// Failures while draining the closing records are swallowed; the
    /// transport is closed regardless.
    pub fn shutdown(&mut self) -> Result<(), TransportError> {
        self.engine.close_outbound();
        // bounded pump so a wedged transport cannot spin this forever
        for _ in 0..8 {
            if self.engine.is_outbound_done() && self.out_records.is_empty() {
                break;
            }
            match self.engine.wrap(&[], &mut self.out_records) {
                Ok(result) if result.status == EngineStatus::BufferOverflow => {
                    self.out_records.grow(self.engine.max_record_size());
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "engine failed during shutdown");
                    break;
                }
            }
            if let Err(e) = self.drain_out_records() {
                tracing::debug!(error = %e, "transport refused closing records");
                break;
            }
        }
        self.transport.close()
    }

    fn run_delegated_tasks(&mut self) {
        while let Some(task) = self.engine.delegated_task() {
            task();
        }
    }

    /// Flush buffered outbound record bytes; true once fully drained.
    fn drain_out_records(&mut self) -> Result<bool, TransportError> {
        while !self.out_records.is_empty() {
            let n = self.transport.flush(&mut self.out_records)?;
            if n == 0 {
                return Ok(false);
            }
        }
        self.out_records.clear();
        Ok(true)
    }

    /// Read wire bytes into the inbound record window.
    fn fill_records(&mut self) -> Result<FillOutcome, TransportError> {
        if self.in_records.space() == 0 {
            self.in_records.compact();
            if self.in_records.space() == 0 {
                self.in_records.grow(self.engine.max_record_size());
            }
        }
        self.transport.fill(&mut self.in_records)
    }
}

impl<T: Transport, E: TlsEngine> Transport for TlsEndpoint<T, E> {
    /// Fill `window` with plaintext, driving the handshake as needed.
    ///
    /// Handshake records are produced and flushed from inside this call;
    /// a fill can therefore cause writes.
    fn fill(&mut self, window: &mut ByteWindow) -> Result<FillOutcome, TransportError> {
        // a handshake record stuck behind a write-blocked transport
        // stalls a read-driven handshake; retry it on every fill
        if !self.out_records.is_empty() {
            self.drain_out_records()?;
        }
        let mut produced = 0usize;
        loop {
            match self.engine.handshake_status() {
                HandshakeStatus::NeedTask => {
                    if !self.inline_tasks {
                        return if produced > 0 {
                            Ok(FillOutcome::Read(produced))
                        } else {
                            Ok(FillOutcome::Idle)
                        };
                    }
                    self.run_delegated_tasks();
                    continue;
                }
                HandshakeStatus::NeedWrap => {
                    let result = self.engine.wrap(&[], &mut self.out_records)?;
                    match result.status {
                        EngineStatus::Closed => {
                            return Err(TransportError::Protocol("tls engine closed"));
                        }
                        EngineStatus::BufferOverflow => {
                            tracing::debug!("record window full during handshake wrap, growing");
                            self.out_records.grow(self.engine.max_record_size());
                        }
                        EngineStatus::BufferUnderflow | EngineStatus::Ok => {}
                    }
                    self.drain_out_records()?;
                    continue;
                }
                HandshakeStatus::NeedUnwrap
                | HandshakeStatus::NotHandshaking
                | HandshakeStatus::Finished => {}
            }

            if !self.in_records.is_empty() {
                let result = self.engine.unwrap(&mut self.in_records, window)?;
                produced += result.produced;
                match result.status {
                    EngineStatus::Closed => {
                        return if produced > 0 {
                            Ok(FillOutcome::Read(produced))
                        } else {
                            Ok(FillOutcome::Eof)
                        };
                    }
                    EngineStatus::BufferOverflow => {
                        if produced > 0 {
                            // deliver what fits; the rest stays recorded
                            return Ok(FillOutcome::Read(produced));
                        }
                        tracing::debug!("plaintext window full during unwrap, growing");
                        window.grow(self.engine.max_record_size());
                        continue;
                    }
                    EngineStatus::BufferUnderflow => {
                        tracing::debug!("partial record buffered, reading more");
                        // fall through to the transport read below
                    }
                    EngineStatus::Ok => {
                        if result.consumed > 0 || result.produced > 0 {
                            continue;
                        }
                    }
                }
            }

            if produced > 0 {
                return Ok(FillOutcome::Read(produced));
            }

            match self.fill_records()? {
                FillOutcome::Read(_) => {}
                FillOutcome::Idle => return Ok(FillOutcome::Idle),
                FillOutcome::Eof => {
                    return if self.engine.handshake_status() == HandshakeStatus::NeedUnwrap {
                        Err(TransportError::Protocol("stream closed during handshake"))
                    } else {
                        Ok(FillOutcome::Eof)
                    };
                }
            }
        }
    }

    fn flush(&mut self, window: &mut ByteWindow) -> Result<usize, TransportError> {
        let consumed = {
            let data = window.as_slice();
            self.flush_regions(data, &[], &[])?
        };
        window.skip(consumed);
        Ok(consumed)
    }

    fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.shutdown()
    }
}
