//! Chat room handler.

use crate::protocols::next_line;
use crate::runtime::{Buffer, BufferError, Outbox, ProcessResult, Session};
use tracing::debug;

/// Sent to every new connection.
pub const WELCOME: &[u8] = b"Welcome to budgetchat! What shall I call you?\n";

/// Sent before disconnecting a client that picked an unusable name.
pub const ILLEGAL_NAME: &[u8] = b"* illegal name\n";

/// Longest accepted name.
pub const MAX_NAME_LEN: usize = 16;

/// Room membership of one connection.
#[derive(Debug, Default)]
pub struct Member {
    name: Option<String>,
}

impl Member {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name, once joined.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Validate a requested name.
pub fn parse_name(line: &[u8]) -> Option<String> {
    let valid = !line.is_empty()
        && line.len() <= MAX_NAME_LEN
        && line.iter().all(u8::is_ascii_alphanumeric);
    valid.then(|| String::from_utf8_lossy(line).into_owned())
}

/// Greet a new connection.
pub fn on_open(_member: &mut Member, out: &mut Outbox<'_>) -> Result<(), BufferError> {
    out.send(WELCOME)
}

/// Handle the name line, then relay chat lines.
pub fn process(
    member: &mut Member,
    input: &mut Buffer,
    out: &mut Outbox<'_>,
) -> Result<ProcessResult, BufferError> {
    let mut messages = 0;

    while let Some((line, used)) = next_line(input.as_slice()) {
        messages += 1;

        match member.name() {
            Some(name) => {
                let mut message = Vec::with_capacity(name.len() + line.len() + 4);
                message.push(b'[');
                message.extend_from_slice(name.as_bytes());
                message.extend_from_slice(b"] ");
                message.extend_from_slice(line);
                message.push(b'\n');
                broadcast(out, &message)?;
            }
            None => {
                let Some(name) = parse_name(line) else {
                    debug!(conn_id = out.id(), "Rejected chat name");
                    out.send(ILLEGAL_NAME)?;
                    input.clear();
                    return Ok(ProcessResult::close(messages));
                };
                join(member, name, out)?;
            }
        }

        input.consume(used);
    }

    Ok(ProcessResult::consumed(messages))
}

/// Announce that a joined member left.
pub fn on_depart(member: &mut Member, out: &mut Outbox<'_>) -> Result<(), BufferError> {
    let Some(name) = member.name.take() else {
        return Ok(());
    };
    debug!(conn_id = out.id(), name = %name, "Member left");
    broadcast(out, format!("* {name} has left the room\n").as_bytes())
}

fn join(member: &mut Member, name: String, out: &mut Outbox<'_>) -> Result<(), BufferError> {
    let room = room(out);

    let names: Vec<&str> = room.iter().map(|(_, name)| name.as_str()).collect();
    out.send(format!("* The room contains: {}\n", names.join(", ")).as_bytes())?;

    let entered = format!("* {name} has entered the room\n");
    for (id, _) in &room {
        out.send_to(*id, entered.as_bytes())?;
    }

    debug!(conn_id = out.id(), name = %name, "Member joined");
    member.name = Some(name);
    Ok(())
}

/// Send to every other joined member.
fn broadcast(out: &mut Outbox<'_>, message: &[u8]) -> Result<(), BufferError> {
    for (id, _) in room(out) {
        out.send_to(id, message)?;
    }
    Ok(())
}

/// Other joined, open members with their names.
fn room(out: &Outbox<'_>) -> Vec<(usize, String)> {
    out.peers()
        .into_iter()
        .filter_map(|id| match out.session(id) {
            Some(Session::Chat(member)) => member.name().map(|name| (id, name.to_string())),
            _ => None,
        })
        .collect()
}
