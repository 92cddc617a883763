//! Module for the one-shot admin command.
//!
//! Connects to the server, sends one of REFRESH, SHUTDOWN or STATUS and prints the command sent and the reply.
//!
mod functions;

pub use functions::*;
