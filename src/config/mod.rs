//! Module for the server wide measurement configuration.
//!
//! The targets and request paths are read from two text files, one entry per line.
//! They are reloaded only with the REFRESH command. Sessions read an immutable snapshot.
//!
mod structs;
mod functions;

pub use structs::*;
pub use functions::*;
