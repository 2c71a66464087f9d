//! Buffered I/O primitives for the wireline connector stack.
//!
//! This crate provides the two abstractions everything above it is built
//! on:
//!
//! - [`ByteWindow`] - a growable, compactable byte region with a read
//!   cursor, a write cursor, and an optional mark, supporting zero-copy
//!   slicing. The HTTP parser and the TLS endpoint both operate on it.
//! - [`Transport`] - the non-blocking fill/flush contract of a network
//!   endpoint. "No data yet" is a normal outcome ([`FillOutcome::Idle`]),
//!   never a blocking wait.
//!
//! In-memory endpoints for tests and loopback use live in [`mem`].

#![deny(unsafe_code)]

pub mod mem;
mod transport;
mod window;

pub use mem::{MemoryEndpoint, ScriptedEndpoint};
pub use transport::{FillOutcome, Transport, TransportError};
pub use window::ByteWindow;
