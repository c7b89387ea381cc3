//! Prime query protocol implementation.
//!
//! Line-oriented JSON request/response:
//!
//! ```text
//! Request:  {"method":"isPrime","number":123}\n
//! Response: {"method":"isPrime","prime":false}\n
//! ```
//!
//! Extra request fields are ignored. Any line that is not valid JSON, is not
//! an object, lacks `method`/`number`, names another method, or carries a
//! non-numeric `number` is malformed: the server answers `{}` and hangs up
//! once that reply is flushed.

pub mod handler;
pub mod parser;

pub use handler::process;
