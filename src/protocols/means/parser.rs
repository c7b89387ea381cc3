//! Record decoding and reply encoding.

use bytes::{Buf, BufMut};

/// Size of every record on the wire.
pub const RECORD_LEN: usize = 9;

/// One decoded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    Insert { timestamp: i32, price: i32 },
    Query { min_time: i32, max_time: i32 },
    /// Unrecognized type byte.
    Unknown(u8),
}

/// Decode the record at the front of `input`.
///
/// Returns `None` until a full record is buffered.
pub fn parse(input: &[u8]) -> Option<Record> {
    let mut frame = input.get(..RECORD_LEN)?;
    let kind = frame.get_u8();
    let first = frame.get_i32();
    let second = frame.get_i32();

    Some(match kind {
        b'I' => Record::Insert {
            timestamp: first,
            price: second,
        },
        b'Q' => Record::Query {
            min_time: first,
            max_time: second,
        },
        other => Record::Unknown(other),
    })
}

/// Encode a query reply.
pub fn encode_mean(mean: i32) -> [u8; 4] {
    let mut reply = [0u8; 4];
    (&mut reply[..]).put_i32(mean);
    reply
}
