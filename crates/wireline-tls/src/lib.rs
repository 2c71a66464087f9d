//! Non-blocking TLS termination for the wireline connector stack.
//!
//! The crate separates the two halves of TLS serving: the [`TlsEngine`]
//! trait is the cryptographic record machine, and [`TlsEndpoint`] is the
//! I/O orchestration around it. The endpoint implements the plaintext
//! [`Transport`](wireline_io::Transport) contract, so a parser stacked
//! on top never knows whether it is reading cleartext or decrypted
//! records.
//!
//! [`NullCipherEngine`] is a framing-only engine used to exercise the
//! orchestration without cryptography.

#![deny(unsafe_code)]

mod endpoint;
mod engine;

pub use endpoint::TlsEndpoint;
pub use engine::{EngineResult, EngineStatus, HandshakeStatus, NullCipherEngine, TlsEngine};
