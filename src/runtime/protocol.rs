//! Protocol dispatch for the event loop.
//!
//! The event loop never interprets bytes itself. After every drain it hands
//! the connection's inbound buffer to the protocol along with an `Outbox`,
//! the only way a protocol can produce output. Protocols are a closed set;
//! each connection carries a `Session` with that protocol's scratch state.

use crate::config::ProtocolType;
use crate::protocols::chat::Member;
use crate::protocols::means::PriceHistory;
use crate::protocols::{chat, echo, means, prime};
use crate::runtime::buffer::{Buffer, BufferError};
use crate::runtime::connection::ConnectionRegistry;

/// Protocol type for command processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Echo,
    Prime,
    Means,
    Chat,
}

impl From<ProtocolType> for Protocol {
    fn from(protocol: ProtocolType) -> Self {
        match protocol {
            ProtocolType::Echo => Protocol::Echo,
            ProtocolType::Prime => Protocol::Prime,
            ProtocolType::Means => Protocol::Means,
            ProtocolType::Chat => Protocol::Chat,
        }
    }
}

impl Protocol {
    /// Fresh per-connection state for this protocol.
    pub fn new_session(self) -> Session {
        match self {
            Protocol::Echo => Session::Echo,
            Protocol::Prime => Session::Prime,
            Protocol::Means => Session::Means(PriceHistory::new()),
            Protocol::Chat => Session::Chat(Member::new()),
        }
    }
}

/// Per-connection protocol state.
#[derive(Debug)]
pub enum Session {
    Echo,
    Prime,
    Means(PriceHistory),
    Chat(Member),
}

/// Result of processing a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessResult {
    /// Complete messages consumed from the inbound buffer.
    pub messages: usize,
    /// Protocol wants the connection closed once its output is flushed.
    pub close: bool,
}

impl ProcessResult {
    pub fn consumed(messages: usize) -> Self {
        Self {
            messages,
            close: false,
        }
    }

    pub fn close(messages: usize) -> Self {
        Self {
            messages,
            close: true,
        }
    }
}

/// Write access to the outbound buffers of live connections.
///
/// Every connection written to is recorded so the event loop can request
/// write readiness for it once the protocol returns.
pub struct Outbox<'a> {
    connections: &'a mut ConnectionRegistry,
    current: usize,
    touched: &'a mut Vec<usize>,
}

impl<'a> Outbox<'a> {
    pub(crate) fn new(
        connections: &'a mut ConnectionRegistry,
        current: usize,
        touched: &'a mut Vec<usize>,
    ) -> Self {
        Self {
            connections,
            current,
            touched,
        }
    }

    /// Id of the connection being served.
    pub fn id(&self) -> usize {
        self.current
    }

    /// Queue bytes for the connection being served.
    pub fn send(&mut self, data: &[u8]) -> Result<(), BufferError> {
        self.send_to(self.current, data)
    }

    /// Queue bytes for any live connection. Unknown or closed ids are skipped.
    pub fn send_to(&mut self, id: usize, data: &[u8]) -> Result<(), BufferError> {
        if data.is_empty() {
            return Ok(());
        }
        if let Some(conn) = self.connections.get_mut(id) {
            conn.outbound.append(data)?;
            self.touched.push(id);
        }
        Ok(())
    }

    /// Snapshot of the other connections that are still open.
    pub fn peers(&self) -> Vec<usize> {
        self.connections
            .ids()
            .into_iter()
            .filter(|&id| id != self.current)
            .filter(|&id| self.connections.get(id).is_some_and(|c| c.is_open()))
            .collect()
    }

    /// Session of another connection. `None` for the connection being served.
    pub fn session(&self, id: usize) -> Option<&Session> {
        self.connections.get(id)?.session.as_ref()
    }
}

/// Called once right after a connection is accepted.
pub fn on_open(session: &mut Session, out: &mut Outbox<'_>) -> Result<(), BufferError> {
    match session {
        Session::Chat(member) => chat::on_open(member, out),
        Session::Echo | Session::Prime | Session::Means(_) => Ok(()),
    }
}

/// Called after each drain with everything not yet consumed.
pub fn on_data(
    session: &mut Session,
    input: &mut Buffer,
    out: &mut Outbox<'_>,
) -> Result<ProcessResult, BufferError> {
    match session {
        Session::Echo => echo::process(input, out),
        Session::Prime => prime::process(input, out),
        Session::Means(history) => means::process(history, input, out),
        Session::Chat(member) => chat::process(member, input, out),
    }
}

/// Called once when the connection stops being open.
pub fn on_depart(session: &mut Session, out: &mut Outbox<'_>) -> Result<(), BufferError> {
    match session {
        Session::Chat(member) => chat::on_depart(member, out),
        Session::Echo | Session::Prime | Session::Means(_) => Ok(()),
    }
}
