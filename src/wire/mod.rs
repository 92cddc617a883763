//! Module for the wire format shared by the server and the nodes.
//!
//! Two shapes of message travel on the same TCP stream:
//! - a command: exactly one byte from the closed [Command] set.
//! - a framed object: `[4-byte big-endian length][zlib(msgpack(object))]`.
//!
mod structs;
mod functions;

pub use structs::*;
pub use functions::*;
