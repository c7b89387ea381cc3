//! Chat room protocol implementation.
//!
//! Line-oriented broadcast room shared by every connection on the listener:
//!
//! ```text
//! S: Welcome to budgetchat! What shall I call you?
//! C: alice
//! S: * The room contains: bob, carol
//! C: hi all
//! (bob and carol receive "[alice] hi all")
//! ```
//!
//! The first line names the member (1 to 16 ASCII letters or digits).
//! Joining and leaving are announced to everyone else in the room; chat
//! lines are relayed to every other joined member, never back to the sender.

pub mod handler;

pub use handler::{on_depart, on_open, process, Member};
