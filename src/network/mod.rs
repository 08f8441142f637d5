//! Networking: length-prefixed JSON events over TCP
//!
//! - `protocol`: frame codec and the named client/server events
//! - `peer`: per-connection reader and writer threads
//! - `server`: listener that hands connections to a `ConnectionHandler`
//! - `client`: the player side of a connection

pub mod client;
pub mod peer;
pub mod protocol;
pub mod server;

pub use client::Client;
pub use protocol::{ClientMessage, ServerMessage};
pub use server::{ConnId, ConnectionHandler, Server, DEFAULT_PORT};
