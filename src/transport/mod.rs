//! Module for the per-connection send and receive primitives.
//!
//! A [Connection] wraps one stream. Any failure closes it; receives return `None` once closed.
//! There is no reconnect here: the caller retries the whole exchange.
//!
mod structs;
mod functions;

pub use structs::*;
