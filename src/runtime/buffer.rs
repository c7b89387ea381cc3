//! Growable per-connection byte buffer.
//!
//! Each connection owns one inbound and one outbound `Buffer`. Bytes are
//! appended at the tail and consumed from the front. Capacity grows by
//! doubling from `MIN_CAPACITY` and is never given back while the buffer
//! lives, so a connection keeps its high-water mark until it closes.

use std::fmt;
use std::io;

/// Capacity of the first allocation.
pub const MIN_CAPACITY: usize = 4096;

/// Error returned when a buffer cannot grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    /// The allocator refused to provide the requested capacity.
    OutOfMemory {
        /// Capacity that was asked for.
        requested: usize,
    },
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::OutOfMemory { requested } => {
                write!(f, "Failed to grow buffer to {requested} bytes")
            }
        }
    }
}

impl std::error::Error for BufferError {}

impl From<BufferError> for io::Error {
    fn from(e: BufferError) -> Self {
        io::Error::new(io::ErrorKind::OutOfMemory, e)
    }
}

/// Append-only byte accumulator with prefix consumption.
///
/// `storage` is always fully initialized; its length is the capacity and
/// `len` marks how much of it holds live data.
#[derive(Debug, Default)]
pub struct Buffer {
    storage: Vec<u8>,
    len: usize,
}

impl Buffer {
    /// Create an empty buffer. Nothing is allocated until the first append.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently held.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocated size.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// The live bytes, oldest first.
    pub fn as_slice(&self) -> &[u8] {
        &self.storage[..self.len]
    }

    /// Append `data` at the tail, growing the allocation if needed.
    ///
    /// On failure the buffer is left unchanged.
    pub fn append(&mut self, data: &[u8]) -> Result<(), BufferError> {
        self.reserve(data.len())?;
        self.storage[self.len..self.len + data.len()].copy_from_slice(data);
        self.len += data.len();
        Ok(())
    }

    /// Drop the first `n` bytes, shifting the remainder to the front.
    ///
    /// Consuming everything (or more) is O(1) and just resets the length.
    pub fn consume(&mut self, n: usize) {
        if n >= self.len {
            self.len = 0;
            return;
        }
        self.storage.copy_within(n..self.len, 0);
        self.len -= n;
    }

    /// Drop all bytes, keeping the allocation.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Ensure room for `additional` more bytes.
    fn reserve(&mut self, additional: usize) -> Result<(), BufferError> {
        let capacity = self.capacity();
        if capacity - self.len >= additional {
            return Ok(());
        }

        let needed = self
            .len
            .checked_add(additional)
            .ok_or(BufferError::OutOfMemory { requested: usize::MAX })?;

        let mut new_capacity = capacity.max(MIN_CAPACITY);
        while new_capacity < needed {
            new_capacity = new_capacity
                .checked_mul(2)
                .ok_or(BufferError::OutOfMemory { requested: needed })?;
        }

        self.storage
            .try_reserve_exact(new_capacity - capacity)
            .map_err(|_| BufferError::OutOfMemory {
                requested: new_capacity,
            })?;
        self.storage.resize(new_capacity, 0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_buffer_is_unallocated() {
        let buf = Buffer::new();
        assert!(buf.is_empty());
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.capacity(), 0);
        assert_eq!(buf.as_slice(), b"");
    }

    #[test]
    fn test_append_concatenates() {
        let mut buf = Buffer::new();
        buf.append(b"hello ").unwrap();
        buf.append(b"").unwrap();
        buf.append(b"world").unwrap();

        assert_eq!(buf.as_slice(), b"hello world");
        assert_eq!(buf.len(), 11);
        assert_eq!(buf.capacity(), MIN_CAPACITY);
    }

    #[test]
    fn test_capacity_doubles() {
        let mut buf = Buffer::new();
        buf.append(&[1u8; MIN_CAPACITY]).unwrap();
        assert_eq!(buf.capacity(), MIN_CAPACITY);

        buf.append(&[2u8; 1]).unwrap();
        assert_eq!(buf.capacity(), MIN_CAPACITY * 2);

        // One append larger than a single doubling.
        buf.append(&vec![3u8; MIN_CAPACITY * 5]).unwrap();
        assert_eq!(buf.capacity(), MIN_CAPACITY * 8);
        assert_eq!(buf.len(), MIN_CAPACITY * 6 + 1);
        assert!(buf.len() <= buf.capacity());
    }

    #[test]
    fn test_consume_prefix() {
        let mut buf = Buffer::new();
        buf.append(b"abcdefgh").unwrap();

        buf.consume(3);
        assert_eq!(buf.as_slice(), b"defgh");

        buf.consume(0);
        assert_eq!(buf.as_slice(), b"defgh");

        buf.append(b"ij").unwrap();
        assert_eq!(buf.as_slice(), b"defghij");
    }

    #[test]
    fn test_consume_all_keeps_capacity() {
        let mut buf = Buffer::new();
        buf.append(&vec![7u8; MIN_CAPACITY * 3]).unwrap();
        let high_water = buf.capacity();

        buf.consume(buf.len());
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), high_water);

        buf.append(b"x").unwrap();
        buf.consume(100);
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), high_water);
    }

    #[test]
    fn test_consume_matches_original_suffix() {
        let pieces: [&[u8]; 4] = [b"The ", b"quick ", b"brown ", b"fox"];
        let expected: Vec<u8> = pieces.concat();

        for n in 0..=expected.len() {
            let mut buf = Buffer::new();
            for piece in pieces {
                buf.append(piece).unwrap();
            }
            assert_eq!(buf.as_slice(), &expected[..]);

            buf.consume(n);
            assert_eq!(buf.as_slice(), &expected[n..]);
        }
    }

    #[test]
    fn test_out_of_memory_leaves_buffer_intact() {
        let mut buf = Buffer::new();
        buf.append(b"keep").unwrap();

        let err = buf.reserve(usize::MAX).unwrap_err();
        assert!(matches!(err, BufferError::OutOfMemory { .. }));
        assert_eq!(buf.as_slice(), b"keep");

        let io_err: io::Error = err.into();
        assert_eq!(io_err.kind(), io::ErrorKind::OutOfMemory);
    }
}
