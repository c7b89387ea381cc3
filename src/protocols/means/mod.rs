//! Price history protocol implementation.
//!
//! Fixed-length binary records, 9 bytes each: one type byte followed by two
//! big-endian signed 32-bit integers.
//!
//! ```text
//! 'I' <timestamp> <price>      insert a price sample
//! 'Q' <mintime>   <maxtime>    reply with the mean price in [mintime, maxtime]
//! ```
//!
//! A query reply is a single big-endian i32. Each connection keeps its own
//! history; nothing is shared between clients. Records with any other type
//! byte are skipped.

pub mod handler;
pub mod history;
pub mod parser;

pub use handler::process;
pub use history::PriceHistory;
