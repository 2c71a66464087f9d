//! TLS engine abstraction.
//!
//! A [`TlsEngine`] is an opaque record machine: plaintext goes in one
//! side and comes out as wire records on the other, and vice versa. The
//! endpoint never inspects record contents; it only reacts to the
//! engine's status codes and handshake demands. That keeps the
//! cryptography swappable and the I/O orchestration testable with a
//! cipherless stand-in.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use wireline_io::ByteWindow;

/// What the engine needs before it can make further progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStatus {
    /// No handshake in progress.
    NotHandshaking,
    /// The engine needs records from the peer; fill and unwrap.
    NeedUnwrap,
    /// The engine has records to send; wrap and flush.
    NeedWrap,
    /// The engine has computation to run before continuing.
    NeedTask,
    /// The handshake just completed.
    Finished,
}

/// Outcome classification of a wrap or unwrap call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    /// The operation completed; check consumed/produced for progress.
    Ok,
    /// The engine is closed in this direction.
    Closed,
    /// The destination window cannot hold the next record; grow it and
    /// retry.
    BufferOverflow,
    /// The source does not hold a complete record yet; read more first.
    BufferUnderflow,
}

/// Byte accounting for one wrap or unwrap call.
#[derive(Debug, Clone, Copy)]
pub struct EngineResult {
    /// Outcome classification.
    pub status: EngineStatus,
    /// Source bytes consumed.
    pub consumed: usize,
    /// Destination bytes produced.
    pub produced: usize,
}

/// An opaque TLS record machine.
///
/// `wrap` takes plaintext regions in order and produces wire records;
/// `unwrap` takes wire records and produces plaintext. Both report
/// progress through [`EngineResult`] and never touch the transport.
pub trait TlsEngine {
    /// Encrypt plaintext from `src` regions (consumed in order) into
    /// wire records in `dst`.
    fn wrap(&mut self, src: &[&[u8]], dst: &mut ByteWindow) -> io::Result<EngineResult>;

    /// Decrypt wire records from `src` into plaintext in `dst`.
    fn unwrap(&mut self, src: &mut ByteWindow, dst: &mut ByteWindow) -> io::Result<EngineResult>;

    /// What the engine needs next.
    fn handshake_status(&self) -> HandshakeStatus;

    /// Next pending handshake computation, if any.
    fn delegated_task(&mut self) -> Option<Box<dyn FnOnce() + Send>>;

    /// Begin an orderly outbound shutdown; subsequent wraps produce the
    /// closing record(s).
    fn close_outbound(&mut self);

    /// Returns true once the closing record has been produced.
    fn is_outbound_done(&self) -> bool;

    /// Largest wire record this engine will produce, used to size the
    /// endpoint's record windows.
    fn max_record_size(&self) -> usize;
}

// ============================================================================
// Null-cipher engine
// ============================================================================

/// Record type octets used by [`NullCipherEngine`].
mod record {
    pub const ALERT: u8 = 0x15;
    pub const HANDSHAKE: u8 = 0x16;
    pub const APPLICATION: u8 = 0x17;
    /// Type octet plus big-endian u16 payload length.
    pub const HEADER_LEN: usize = 3;
}

/// A [`TlsEngine`] that frames but does not encrypt.
///
/// Payloads travel as `type | len_be16 | bytes` records with no
/// cryptography, which makes every wrapped byte inspectable. A handshake
/// can be scripted as a status sequence so the endpoint's orchestration
/// paths are reachable from tests; without a script the engine starts
/// out not handshaking.
#[derive(Debug)]
pub struct NullCipherEngine {
    script: VecDeque<HandshakeStatus>,
    max_record: usize,
    outbound_closed: bool,
    close_record_sent: bool,
    inbound_closed: bool,
    tasks_completed: Arc<AtomicUsize>,
}

impl Default for NullCipherEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl NullCipherEngine {
    /// Engine with no handshake and the default record size.
    #[must_use]
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            max_record: 16 * 1024,
            outbound_closed: false,
            close_record_sent: false,
            inbound_closed: false,
            tasks_completed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Engine that walks the given handshake statuses before settling
    /// into `NotHandshaking`.
    #[must_use]
    pub fn with_handshake(script: Vec<HandshakeStatus>) -> Self {
        let mut engine = Self::new();
        engine.script = script.into();
        engine
    }

    /// Cap the record payload size, to exercise partial-consume and
    /// overflow paths.
    #[must_use]
    pub fn with_max_record(mut self, max_record: usize) -> Self {
        self.max_record = max_record;
        self
    }

    /// How many delegated tasks have been executed.
    #[must_use]
    pub fn tasks_completed(&self) -> usize {
        self.tasks_completed.load(Ordering::SeqCst)
    }

    /// Returns true once a closing record from the peer was unwrapped.
    #[must_use]
    pub fn is_inbound_closed(&self) -> bool {
        self.inbound_closed
    }

    fn put_record(dst: &mut ByteWindow, kind: u8, payload: &[u8]) {
        let len = u16::try_from(payload.len()).unwrap_or(u16::MAX);
        dst.put_slice(&[kind, (len >> 8) as u8, (len & 0xff) as u8]);
        dst.put_slice(payload);
    }
}

impl TlsEngine for NullCipherEngine {
    fn wrap(&mut self, src: &[&[u8]], dst: &mut ByteWindow) -> io::Result<EngineResult> {
        if self.outbound_closed {
            if self.close_record_sent {
                return Ok(EngineResult {
                    status: EngineStatus::Closed,
                    consumed: 0,
                    produced: 0,
                });
            }
            if dst.space() < record::HEADER_LEN {
                return Ok(EngineResult {
                    status: EngineStatus::BufferOverflow,
                    consumed: 0,
                    produced: 0,
                });
            }
            Self::put_record(dst, record::ALERT, &[]);
            self.close_record_sent = true;
            return Ok(EngineResult {
                status: EngineStatus::Ok,
                consumed: 0,
                produced: record::HEADER_LEN,
            });
        }

        if self.handshake_status() == HandshakeStatus::NeedWrap {
            if dst.space() < record::HEADER_LEN + 1 {
                return Ok(EngineResult {
                    status: EngineStatus::BufferOverflow,
                    consumed: 0,
                    produced: 0,
                });
            }
            Self::put_record(dst, record::HANDSHAKE, &[0]);
            self.script.pop_front();
            return Ok(EngineResult {
                status: EngineStatus::Ok,
                consumed: 0,
                produced: record::HEADER_LEN + 1,
            });
        }

        let total: usize = src.iter().map(|r| r.len()).sum();
        if total == 0 {
            return Ok(EngineResult {
                status: EngineStatus::Ok,
                consumed: 0,
                produced: 0,
            });
        }
        let payload_len = total.min(self.max_record.saturating_sub(record::HEADER_LEN));
        if dst.space() < record::HEADER_LEN + payload_len {
            return Ok(EngineResult {
                status: EngineStatus::BufferOverflow,
                consumed: 0,
                produced: 0,
            });
        }

        let mut payload = Vec::with_capacity(payload_len);
        for region in src {
            if payload.len() == payload_len {
                break;
            }
            let take = region.len().min(payload_len - payload.len());
            payload.extend_from_slice(&region[..take]);
        }
        Self::put_record(dst, record::APPLICATION, &payload);
        Ok(EngineResult {
            status: EngineStatus::Ok,
            consumed: payload_len,
            produced: record::HEADER_LEN + payload_len,
        })
    }

    fn unwrap(&mut self, src: &mut ByteWindow, dst: &mut ByteWindow) -> io::Result<EngineResult> {
        if self.inbound_closed {
            return Ok(EngineResult {
                status: EngineStatus::Closed,
                consumed: 0,
                produced: 0,
            });
        }
        let readable = src.as_slice();
        if readable.len() < record::HEADER_LEN {
            return Ok(EngineResult {
                status: EngineStatus::BufferUnderflow,
                consumed: 0,
                produced: 0,
            });
        }
        let kind = readable[0];
        let len = usize::from(readable[1]) << 8 | usize::from(readable[2]);
        if readable.len() < record::HEADER_LEN + len {
            return Ok(EngineResult {
                status: EngineStatus::BufferUnderflow,
                consumed: 0,
                produced: 0,
            });
        }

        match kind {
            record::ALERT => {
                src.skip(record::HEADER_LEN + len);
                self.inbound_closed = true;
                Ok(EngineResult {
                    status: EngineStatus::Closed,
                    consumed: record::HEADER_LEN + len,
                    produced: 0,
                })
            }
            record::HANDSHAKE => {
                src.skip(record::HEADER_LEN + len);
                if self.handshake_status() == HandshakeStatus::NeedUnwrap {
                    self.script.pop_front();
                }
                Ok(EngineResult {
                    status: EngineStatus::Ok,
                    consumed: record::HEADER_LEN + len,
                    produced: 0,
                })
            }
            record::APPLICATION => {
                if dst.space() < len {
                    return Ok(EngineResult {
                        status: EngineStatus::BufferOverflow,
                        consumed: 0,
                        produced: 0,
                    });
                }
                src.skip(record::HEADER_LEN);
                let payload_start = src.get_index();
                src.skip(len);
                let range = payload_start..payload_start + len;
                // split the copy out so src and dst borrows don't overlap
                let payload = src.bytes(range).to_vec();
                dst.put_slice(&payload);
                Ok(EngineResult {
                    status: EngineStatus::Ok,
                    consumed: record::HEADER_LEN + len,
                    produced: len,
                })
            }
            _ => Err(io::Error::other("unrecognized record type")),
        }
    }

    fn handshake_status(&self) -> HandshakeStatus {
        self.script
            .front()
            .copied()
            .unwrap_or(HandshakeStatus::NotHandshaking)
    }

    fn delegated_task(&mut self) -> Option<Box<dyn FnOnce() + Send>> {
        if self.handshake_status() != HandshakeStatus::NeedTask {
            return None;
        }
        self.script.pop_front();
        let counter = Arc::clone(&self.tasks_completed);
        Some(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
    }

    fn close_outbound(&mut self) {
        self.outbound_closed = true;
    }

    fn is_outbound_done(&self) -> bool {
        self.close_record_sent
    }

    fn max_record_size(&self) -> usize {
        self.max_record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(capacity: usize) -> ByteWindow {
        ByteWindow::with_capacity(capacity)
    }

    #[test]
    fn wrap_then_unwrap_round_trips() {
        let mut engine = NullCipherEngine::new();
        let mut records = window(64);
        let result = engine.wrap(&[b"hel", b"lo"], &mut records).unwrap();
        assert_eq!(result.status, EngineStatus::Ok);
        assert_eq!(result.consumed, 5);

        let mut plain = window(64);
        let result = engine.unwrap(&mut records, &mut plain).unwrap();
        assert_eq!(result.status, EngineStatus::Ok);
        assert_eq!(result.produced, 5);
        assert_eq!(plain.as_slice(), b"hello");
    }

    #[test]
    fn partial_record_is_underflow() {
        let mut engine = NullCipherEngine::new();
        let mut records = window(64);
        engine.wrap(&[b"abcdef"], &mut records).unwrap();
        // withhold the final byte
        let full = records.as_slice().to_vec();
        let mut partial = window(64);
        partial.put_slice(&full[..full.len() - 1]);

        let mut plain = window(64);
        let result = engine.unwrap(&mut partial, &mut plain).unwrap();
        assert_eq!(result.status, EngineStatus::BufferUnderflow);
        assert_eq!(result.consumed, 0);

        partial.put_slice(&full[full.len() - 1..]);
        let result = engine.unwrap(&mut partial, &mut plain).unwrap();
        assert_eq!(result.status, EngineStatus::Ok);
        assert_eq!(plain.as_slice(), b"abcdef");
    }

    #[test]
    fn small_destination_is_overflow() {
        let mut engine = NullCipherEngine::new();
        let mut records = window(4);
        let result = engine.wrap(&[b"too big for four"], &mut records).unwrap();
        assert_eq!(result.status, EngineStatus::BufferOverflow);
        assert_eq!(result.consumed, 0);
    }

    #[test]
    fn record_size_cap_limits_consumption() {
        let mut engine = NullCipherEngine::new().with_max_record(8);
        let mut records = window(64);
        let result = engine.wrap(&[b"0123456789"], &mut records).unwrap();
        assert_eq!(result.status, EngineStatus::Ok);
        assert_eq!(result.consumed, 5); // 8-byte record minus 3-byte header
    }

    #[test]
    fn close_produces_single_alert_record() {
        let mut engine = NullCipherEngine::new();
        engine.close_outbound();
        assert!(!engine.is_outbound_done());

        let mut records = window(64);
        let result = engine.wrap(&[], &mut records).unwrap();
        assert_eq!(result.status, EngineStatus::Ok);
        assert!(engine.is_outbound_done());
        assert_eq!(records.as_slice()[0], 0x15);

        let result = engine.wrap(&[b"late"], &mut records).unwrap();
        assert_eq!(result.status, EngineStatus::Closed);
    }

    #[test]
    fn peer_alert_closes_inbound() {
        let mut sender = NullCipherEngine::new();
        sender.close_outbound();
        let mut records = window(64);
        sender.wrap(&[], &mut records).unwrap();

        let mut receiver = NullCipherEngine::new();
        let mut plain = window(64);
        let result = receiver.unwrap(&mut records, &mut plain).unwrap();
        assert_eq!(result.status, EngineStatus::Closed);
        assert!(receiver.is_inbound_closed());
    }

    #[test]
    fn scripted_handshake_walks_statuses() {
        let mut engine = NullCipherEngine::with_handshake(vec![
            HandshakeStatus::NeedWrap,
            HandshakeStatus::NeedTask,
            HandshakeStatus::NeedUnwrap,
            HandshakeStatus::Finished,
        ]);
        assert_eq!(engine.handshake_status(), HandshakeStatus::NeedWrap);

        let mut records = window(64);
        engine.wrap(&[], &mut records).unwrap();
        assert_eq!(engine.handshake_status(), HandshakeStatus::NeedTask);

        let task = engine.delegated_task().expect("task");
        task();
        assert_eq!(engine.tasks_completed(), 1);
        assert_eq!(engine.handshake_status(), HandshakeStatus::NeedUnwrap);

        // feed back the handshake record it produced earlier
        let mut plain = window(64);
        engine.unwrap(&mut records, &mut plain).unwrap();
        assert_eq!(engine.handshake_status(), HandshakeStatus::Finished);
    }
}
