//! Echo protocol implementation.
//!
//! Every byte received is sent back unchanged, in order, with no framing.
//! Useful as a smoke test of the runtime: it exercises partial reads,
//! partial writes and half-close without any parsing in the way.

pub mod handler;

pub use handler::process;
