//! Protocol implementations.
//!
//! Each protocol turns a connection's accumulated input into output through
//! the runtime's `Outbox`. None of them touch sockets.
//!
//! - `echo`: raw byte echo
//! - `prime`: newline-delimited JSON primality queries
//! - `means`: fixed 9-byte price insert/query records
//! - `chat`: line-oriented broadcast chat room

pub mod chat;
pub mod echo;
pub mod means;
pub mod prime;

/// Split the next newline-terminated line off the front of `input`.
///
/// Returns the line without its `\n` (or `\r\n`) and the number of bytes
/// to consume. `None` if no complete line is buffered yet.
pub fn next_line(input: &[u8]) -> Option<(&[u8], usize)> {
    let newline = input.iter().position(|&b| b == b'\n')?;
    let line = &input[..newline];
    Some((line.strip_suffix(b"\r").unwrap_or(line), newline + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_line() {
        assert_eq!(next_line(b"hello\nworld"), Some((&b"hello"[..], 6)));
        assert_eq!(next_line(b"crlf\r\nrest"), Some((&b"crlf"[..], 6)));
        assert_eq!(next_line(b"\n"), Some((&b""[..], 1)));
        assert_eq!(next_line(b"partial"), None);
        assert_eq!(next_line(b""), None);
    }
}
