//! Single-threaded reactor for edge-triggered TCP serving.
//!
//! One thread owns the listener, the multiplexer and every connection:
//! - `Buffer`: growable per-connection byte buffer
//! - `Connection`: connection state machine and slab-backed registry
//! - `Protocol`: the handler contract the event loop dispatches through
//! - `EventLoop`: mio readiness loop (epoll on Linux, kqueue on macOS)

mod buffer;
mod connection;
mod event_loop;
pub mod protocol;

pub use buffer::{Buffer, BufferError};
pub use protocol::{Outbox, ProcessResult, Protocol, Session};

use crate::config::Config;
use event_loop::EventLoop;

/// Bind the configured listener and serve until a fatal error.
pub fn run(config: Config) -> std::io::Result<()> {
    let protocol = Protocol::from(config.protocol);
    let mut event_loop = EventLoop::bind(&config, protocol)?;
    event_loop.run()
}
