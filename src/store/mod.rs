//! Module for storing the measurement records on disk.
//!
//! Every node gets its own append-only text file in the data directory.
//! The first three lines identify the node (id, hostname, address); every following line is one record as json.
//!
mod structs;
mod functions;

pub use structs::*;
