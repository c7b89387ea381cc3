//! Connection state machine for managing TCP connections.
//!
//! Each connection tracks its lifecycle state, its inbound and outbound
//! buffers, and the protocol session attached to it.

use crate::runtime::buffer::Buffer;
use crate::runtime::protocol::Session;
use mio::net::TcpStream;
use mio::{Interest, Registry};
use slab::Slab;
use std::io;
use std::net::{Shutdown, SocketAddr};
use tracing::debug;

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Both directions usable.
    Open,
    /// Peer sent end-of-stream; pending output is still being flushed.
    PeerClosed,
    /// Protocol asked to terminate; pending output is still being flushed.
    Closing,
    /// Terminal. Deregistered, socket shut down, buffers released.
    Closed,
}

/// A single client connection.
#[derive(Debug)]
pub struct Connection {
    pub stream: TcpStream,
    pub peer: SocketAddr,
    pub inbound: Buffer,
    pub outbound: Buffer,
    pub state: ConnState,
    /// Protocol scratch state. Only `None` while lent to a handler or after close.
    pub session: Option<Session>,
    /// Whether the multiplexer entry currently includes write readiness.
    pub(crate) write_interest: bool,
    /// Set once the departure hook has run.
    pub(crate) departed: bool,
}

impl Connection {
    /// Create a new open connection.
    pub fn new(stream: TcpStream, peer: SocketAddr, session: Session) -> Self {
        Self {
            stream,
            peer,
            inbound: Buffer::new(),
            outbound: Buffer::new(),
            state: ConnState::Open,
            session: Some(session),
            write_interest: false,
            departed: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnState::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnState::Closed
    }

    /// Record end-of-stream from the peer.
    pub fn peer_closed(&mut self) {
        if self.state == ConnState::Open {
            self.state = ConnState::PeerClosed;
        }
    }

    /// Record a termination request from the protocol.
    pub fn request_close(&mut self) {
        if matches!(self.state, ConnState::Open | ConnState::PeerClosed) {
            self.state = ConnState::Closing;
        }
    }

    /// True when the connection should close as soon as output is flushed.
    pub fn closes_after_flush(&self) -> bool {
        matches!(self.state, ConnState::PeerClosed | ConnState::Closing)
    }

    /// Interest mask this connection should be registered with.
    pub fn interest(&self) -> Interest {
        if self.outbound.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        }
    }

    /// Whether the registered mask is out of date with the outbound buffer.
    pub fn interest_stale(&self) -> bool {
        self.write_interest == self.outbound.is_empty()
    }
}

/// Registry of live connections using slab allocation.
///
/// Closing a connection leaves a `Closed` tombstone in its slot until
/// `reap` runs, so ids stay unique across one batch of readiness events.
pub struct ConnectionRegistry {
    connections: Slab<Connection>,
    closed: Vec<usize>,
    max_connections: usize,
}

impl ConnectionRegistry {
    /// Create a new registry with specified maximum capacity.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: Slab::with_capacity(max_connections.min(1024)),
            closed: Vec::new(),
            max_connections,
        }
    }

    /// Insert a new connection into the registry.
    ///
    /// Returns `None` if the registry is at capacity.
    pub fn insert(&mut self, conn: Connection) -> Option<usize> {
        if self.connections.len() >= self.max_connections {
            return None;
        }
        Some(self.connections.insert(conn))
    }

    /// Get a live connection.
    pub fn get(&self, id: usize) -> Option<&Connection> {
        self.connections.get(id).filter(|c| !c.is_closed())
    }

    /// Get a live connection mutably.
    pub fn get_mut(&mut self, id: usize) -> Option<&mut Connection> {
        self.connections.get_mut(id).filter(|c| !c.is_closed())
    }

    /// Check if a live connection exists.
    pub fn contains(&self, id: usize) -> bool {
        self.get(id).is_some()
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len() - self.closed.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of all live connections, in slot order.
    ///
    /// A snapshot: callers may close entries while walking it.
    pub fn ids(&self) -> Vec<usize> {
        self.connections
            .iter()
            .filter(|(_, c)| !c.is_closed())
            .map(|(id, _)| id)
            .collect()
    }

    /// Close a connection.
    ///
    /// Deregisters from the multiplexer (ignoring errors), shuts the socket
    /// down and releases both buffers. Returns `false` if the connection was
    /// already closed or never existed.
    pub fn close(&mut self, id: usize, registry: &Registry) -> bool {
        let conn = match self.connections.get_mut(id) {
            Some(conn) if !conn.is_closed() => conn,
            _ => return false,
        };

        if let Err(e) = registry.deregister(&mut conn.stream) {
            if e.kind() != io::ErrorKind::NotFound {
                debug!(conn_id = id, error = %e, "Deregister failed");
            }
        }
        if let Err(e) = conn.stream.shutdown(Shutdown::Both) {
            if e.kind() != io::ErrorKind::NotConnected {
                debug!(conn_id = id, error = %e, "Shutdown failed");
            }
        }

        conn.inbound = Buffer::new();
        conn.outbound = Buffer::new();
        conn.session = None;
        conn.write_interest = false;
        conn.state = ConnState::Closed;
        self.closed.push(id);

        debug!(conn_id = id, peer = %conn.peer, "Connection closed");
        true
    }

    /// Free the slots of connections closed since the last reap.
    pub fn reap(&mut self) {
        for id in self.closed.drain(..) {
            if self.connections.get(id).is_some_and(Connection::is_closed) {
                self.connections.remove(id);
            }
        }
    }

    /// Maximum number of connections allowed.
    pub fn capacity(&self) -> usize {
        self.max_connections
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::runtime::Protocol;
    use mio::{Poll, Token};
    use std::io::Read;

    /// A registered-ready server-side stream plus its client peer.
    pub(crate) fn stream_pair() -> (TcpStream, SocketAddr, std::net::TcpStream) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let client = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, peer) = listener.accept().unwrap();
        server.set_nonblocking(true).unwrap();
        (TcpStream::from_std(server), peer, client)
    }

    fn connection() -> (Connection, std::net::TcpStream) {
        let (stream, peer, client) = stream_pair();
        (
            Connection::new(stream, peer, Protocol::Echo.new_session()),
            client,
        )
    }

    #[test]
    fn test_connection_state_transitions() {
        let (mut conn, _client) = connection();
        assert!(conn.is_open());
        assert!(!conn.closes_after_flush());

        conn.peer_closed();
        assert_eq!(conn.state, ConnState::PeerClosed);
        assert!(conn.closes_after_flush());

        conn.request_close();
        assert_eq!(conn.state, ConnState::Closing);

        // A later end-of-stream does not reopen or downgrade.
        conn.peer_closed();
        assert_eq!(conn.state, ConnState::Closing);
    }

    #[test]
    fn test_interest_follows_outbound() {
        let (mut conn, _client) = connection();
        assert_eq!(conn.interest(), Interest::READABLE);
        assert!(!conn.interest_stale());

        conn.outbound.append(b"pending").unwrap();
        assert_eq!(conn.interest(), Interest::READABLE | Interest::WRITABLE);
        assert!(conn.interest_stale());

        conn.write_interest = true;
        assert!(!conn.interest_stale());

        conn.outbound.consume(7);
        assert_eq!(conn.interest(), Interest::READABLE);
        assert!(conn.interest_stale());
    }

    #[test]
    fn test_connection_registry() {
        let poll = Poll::new().unwrap();
        let mut registry = ConnectionRegistry::new(2);

        let (c1, _k1) = connection();
        let (c2, _k2) = connection();
        let (c3, _k3) = connection();

        let id1 = registry.insert(c1).unwrap();
        let id2 = registry.insert(c2).unwrap();

        // At capacity
        assert!(registry.insert(c3).is_none());
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids(), vec![id1, id2]);

        assert!(registry.close(id1, poll.registry()));
        assert!(!registry.contains(id1));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.ids(), vec![id2]);

        // The tombstone still holds the slot until reaped.
        let (c4, _k4) = connection();
        assert!(registry.insert(c4).is_none());

        registry.reap();
        let (c5, _k5) = connection();
        assert_eq!(registry.insert(c5), Some(id1));
    }

    #[test]
    fn test_close_is_idempotent() {
        let poll = Poll::new().unwrap();
        let mut registry = ConnectionRegistry::new(4);

        let (mut conn, mut client) = connection();
        poll.registry()
            .register(&mut conn.stream, Token(0), Interest::READABLE)
            .unwrap();
        conn.outbound.append(b"never sent").unwrap();
        let id = registry.insert(conn).unwrap();

        assert!(registry.close(id, poll.registry()));
        assert!(!registry.close(id, poll.registry()));
        assert!(registry.get(id).is_none());
        assert_eq!(registry.len(), 0);

        registry.reap();
        assert!(!registry.close(id, poll.registry()));
        registry.reap();
        assert!(registry.is_empty());

        // Peer observes end-of-stream, not the discarded output.
        let mut received = Vec::new();
        client.read_to_end(&mut received).unwrap();
        assert!(received.is_empty());
    }

    #[test]
    fn test_close_without_registration() {
        let poll = Poll::new().unwrap();
        let mut registry = ConnectionRegistry::new(1);
        let (conn, _client) = connection();
        let id = registry.insert(conn).unwrap();

        // Never registered: deregister fails and is ignored.
        assert!(registry.close(id, poll.registry()));
        assert!(!registry.close(id + 1, poll.registry()));
    }
}
