//! Module for the coordinating server.
//!
//! The server accepts one TCP connection per exchange and handles exactly one command on it:
//! - REFRESH: reload the targets and request paths.
//! - SHUTDOWN: stop accepting, let running sessions finish, exit.
//! - STATUS: log a listing of all known nodes.
//! - HELLO: register a new node in a free slot.
//! - PLANETLAB: a known (or remembered) node uploads its records and gets a fresh configuration.
//!
//! Next to the accept loop a sweep loop evicts nodes that have not been seen for the dead interval.
//!
mod structs;
mod functions;

pub use structs::*;
pub use functions::*;
