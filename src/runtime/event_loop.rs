//! mio event loop implementation.
//!
//! Readiness-based model: poll tells us when sockets are ready,
//! then we perform non-blocking read/write syscalls.
//! Uses epoll on Linux, kqueue on macOS.
//!
//! ## Edge-triggered readiness
//!
//! mio registrations are edge-triggered: a socket is reported once per
//! not-ready to ready transition. Every dispatch therefore loops until the
//! kernel says `WouldBlock`. Stopping early would leave bytes behind with no
//! further notification coming for them.
//!
//! ## Backpressure
//!
//! Connections are registered for `READABLE` only while their outbound
//! buffer is empty and for `READABLE | WRITABLE` while output is queued, so
//! an idle connection never produces write wake-ups.

use crate::config::Config;
use crate::runtime::buffer::{Buffer, BufferError};
use crate::runtime::connection::{ConnState, Connection, ConnectionRegistry};
use crate::runtime::protocol::{self, Outbox, Protocol, Session};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

const LISTENER_TOKEN: Token = Token(usize::MAX);

/// Size of the scratch region each receive lands in.
pub const READ_CHUNK: usize = 64 * 1024;

/// How a read drain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Socket has nothing more to give right now.
    Drained,
    /// Peer sent end-of-stream.
    EndOfStream,
}

/// How a write flush ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Outbound buffer is empty.
    Flushed,
    /// Socket send buffer is full; bytes remain queued.
    Blocked,
}

/// Receive until the reader would block or reports end-of-stream,
/// appending everything to `inbound`.
///
/// Buffer growth failure surfaces as an `OutOfMemory` error.
pub fn drain<R: Read>(
    reader: &mut R,
    scratch: &mut [u8],
    inbound: &mut Buffer,
) -> io::Result<ReadOutcome> {
    loop {
        match reader.read(scratch) {
            Ok(0) => return Ok(ReadOutcome::EndOfStream),
            Ok(n) => inbound.append(&scratch[..n])?,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Ok(ReadOutcome::Drained)
            }
            Err(e) => return Err(e),
        }
    }
}

/// Send from the front of `outbound` until it is empty or the writer
/// would block. Sent bytes are consumed.
pub fn flush<W: Write>(writer: &mut W, outbound: &mut Buffer) -> io::Result<WriteOutcome> {
    while !outbound.is_empty() {
        match writer.write(outbound.as_slice()) {
            Ok(0) => {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0"));
            }
            Ok(n) => outbound.consume(n),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Ok(WriteOutcome::Blocked)
            }
            Err(e) => return Err(e),
        }
    }
    Ok(WriteOutcome::Flushed)
}

/// Create a non-blocking listener with SO_REUSEADDR.
///
/// socket2 sets close-on-exec on Unix when creating the socket.
pub fn create_listener(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    Ok(TcpListener::from_std(socket.into()))
}

/// Single-threaded reactor owning the listener and every connection.
pub struct EventLoop {
    poll: Poll,
    listener: TcpListener,
    connections: ConnectionRegistry,
    protocol: Protocol,
    scratch: Box<[u8]>,
    batch_size: usize,
}

impl EventLoop {
    /// Bind the configured address and set up the reactor.
    pub fn bind(config: &Config, protocol: Protocol) -> io::Result<Self> {
        let addr = config.listen_addr()?;
        let listener = create_listener(addr, config.backlog)?;
        Self::new(listener, protocol, config.max_connections, config.batch_size)
    }

    /// Set up the reactor around an already listening socket.
    pub fn new(
        mut listener: TcpListener,
        protocol: Protocol,
        max_connections: usize,
        batch_size: usize,
    ) -> io::Result<Self> {
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        Ok(Self {
            poll,
            listener,
            connections: ConnectionRegistry::new(max_connections),
            protocol,
            scratch: vec![0u8; READ_CHUNK].into_boxed_slice(),
            batch_size: batch_size.max(1),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    #[cfg(test)]
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// Serve until a fatal error.
    pub fn run(&mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(self.batch_size);
        info!(
            addr = %self.local_addr()?,
            protocol = ?self.protocol,
            batch_size = self.batch_size,
            "Event loop started"
        );

        loop {
            self.turn(&mut events, None)?;
        }
    }

    /// Wait once for readiness and dispatch the resulting batch.
    ///
    /// Any error returned is fatal for the whole server.
    pub fn turn(&mut self, events: &mut Events, timeout: Option<Duration>) -> io::Result<()> {
        if let Err(e) = self.poll.poll(events, timeout) {
            if e.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(e);
        }

        for event in events.iter() {
            match event.token() {
                LISTENER_TOKEN => {
                    if event.is_error() || event.is_read_closed() {
                        return Err(self.listener_error());
                    }
                    self.accept_connections()?;
                }
                Token(conn_id) => {
                    // Closed earlier in this batch: ignore.
                    if !self.connections.contains(conn_id) {
                        continue;
                    }
                    if event.is_error() {
                        debug!(conn_id, "Socket error reported");
                        self.close_connection(conn_id)?;
                        continue;
                    }
                    if event.is_readable() || event.is_read_closed() {
                        self.handle_readable(conn_id)?;
                    }
                    if event.is_writable() {
                        self.handle_writable(conn_id)?;
                    }
                }
            }
        }

        self.connections.reap();
        Ok(())
    }

    fn listener_error(&self) -> io::Error {
        match self.listener.take_error() {
            Ok(Some(e)) | Err(e) => e,
            Ok(None) => io::Error::new(io::ErrorKind::Other, "listener hung up"),
        }
    }

    fn accept_connections(&mut self) -> io::Result<()> {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => self.admit(stream, peer)?,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("Accept error: {}", e);
                    break;
                }
            }
        }
        Ok(())
    }

    fn admit(&mut self, stream: TcpStream, peer: SocketAddr) -> io::Result<()> {
        let conn = Connection::new(stream, peer, self.protocol.new_session());
        let Some(conn_id) = self.connections.insert(conn) else {
            warn!(
                peer = %peer,
                max_connections = self.connections.capacity(),
                "Connection limit reached"
            );
            return Ok(());
        };

        if let Some(conn) = self.connections.get_mut(conn_id) {
            self.poll
                .registry()
                .register(&mut conn.stream, Token(conn_id), Interest::READABLE)?;
        }
        debug!(
            conn_id,
            peer = %peer,
            live = self.connections.len(),
            "Accepted connection"
        );

        self.with_session(conn_id, |session, _, out| protocol::on_open(session, out))?;
        self.settle(conn_id)
    }

    fn handle_readable(&mut self, conn_id: usize) -> io::Result<()> {
        let Some(conn) = self.connections.get_mut(conn_id) else {
            return Ok(());
        };

        match drain(&mut conn.stream, &mut self.scratch, &mut conn.inbound) {
            Ok(ReadOutcome::Drained) => {}
            Ok(ReadOutcome::EndOfStream) => {
                debug!(conn_id, pending = conn.outbound.len(), "Peer closed");
                conn.peer_closed();
            }
            Err(e) if e.kind() == io::ErrorKind::OutOfMemory => return Err(e),
            Err(e) => {
                debug!(conn_id, error = %e, "Read error");
                return self.close_connection(conn_id);
            }
        }

        if conn.state == ConnState::Closing {
            // Already on its way out; input is no longer wanted.
            conn.inbound.clear();
        } else if let Some(result) = self.with_session(conn_id, protocol::on_data)? {
            trace!(conn_id, messages = result.messages, "Processed input");
            if result.close {
                if let Some(conn) = self.connections.get_mut(conn_id) {
                    debug!(conn_id, "Protocol requested close");
                    conn.request_close();
                }
            }
        }

        self.settle(conn_id)
    }

    fn handle_writable(&mut self, conn_id: usize) -> io::Result<()> {
        let Some(conn) = self.connections.get_mut(conn_id) else {
            return Ok(());
        };

        match flush(&mut conn.stream, &mut conn.outbound) {
            Ok(WriteOutcome::Flushed) => {}
            Ok(WriteOutcome::Blocked) => return Ok(()),
            Err(e) => {
                match e.kind() {
                    io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => {
                        debug!(conn_id, error = %e, "Peer went away");
                    }
                    _ => warn!(conn_id, error = %e, "Write error"),
                }
                return self.close_connection(conn_id);
            }
        }

        self.settle(conn_id)
    }

    /// Bring a connection in line with its state after a dispatch: announce
    /// departure, close once a pending close has nothing left to send, or
    /// refresh the interest mask.
    fn settle(&mut self, conn_id: usize) -> io::Result<()> {
        match self.connections.get(conn_id) {
            Some(conn) if !conn.is_open() => self.depart(conn_id)?,
            Some(_) => {}
            None => return Ok(()),
        }

        match self.connections.get(conn_id) {
            Some(conn) if conn.closes_after_flush() && conn.outbound.is_empty() => {
                self.close_connection(conn_id)
            }
            Some(_) => self.update_interest(conn_id),
            None => Ok(()),
        }
    }

    fn update_interest(&mut self, conn_id: usize) -> io::Result<()> {
        let Some(conn) = self.connections.get_mut(conn_id) else {
            return Ok(());
        };
        if !conn.interest_stale() {
            return Ok(());
        }

        let interest = conn.interest();
        match self
            .poll
            .registry()
            .reregister(&mut conn.stream, Token(conn_id), interest)
        {
            Ok(()) => {
                conn.write_interest = interest.is_writable();
                Ok(())
            }
            Err(e) => {
                warn!(conn_id, error = %e, "Failed to update interest");
                self.close_connection(conn_id)
            }
        }
    }

    /// Run the departure hook once.
    fn depart(&mut self, conn_id: usize) -> io::Result<()> {
        match self.connections.get_mut(conn_id) {
            Some(conn) if !conn.departed => conn.departed = true,
            _ => return Ok(()),
        }
        self.with_session(conn_id, |session, _, out| protocol::on_depart(session, out))?;
        Ok(())
    }

    fn close_connection(&mut self, conn_id: usize) -> io::Result<()> {
        if !self.connections.contains(conn_id) {
            return Ok(());
        }
        self.depart(conn_id)?;
        if self.connections.close(conn_id, self.poll.registry()) {
            trace!(live = self.connections.len(), "Connection released");
        }
        Ok(())
    }

    /// Lend a connection's session and inbound buffer to a protocol hook.
    ///
    /// Every connection the hook wrote to gets its interest refreshed.
    /// A buffer growth failure inside the hook is fatal.
    fn with_session<T>(
        &mut self,
        conn_id: usize,
        hook: impl FnOnce(&mut Session, &mut Buffer, &mut Outbox<'_>) -> Result<T, BufferError>,
    ) -> io::Result<Option<T>> {
        let Some(conn) = self.connections.get_mut(conn_id) else {
            return Ok(None);
        };
        let Some(mut session) = conn.session.take() else {
            return Ok(None);
        };
        let mut inbound = std::mem::take(&mut conn.inbound);

        let mut touched = Vec::new();
        let result = hook(
            &mut session,
            &mut inbound,
            &mut Outbox::new(&mut self.connections, conn_id, &mut touched),
        );

        if let Some(conn) = self.connections.get_mut(conn_id) {
            conn.session = Some(session);
            conn.inbound = inbound;
        }
        let value = result?;

        touched.sort_unstable();
        touched.dedup();
        for id in touched {
            self.update_interest(id)?;
        }
        Ok(Some(value))
    }
}
