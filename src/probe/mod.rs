//! Module for probing one target.
//!
//! A probe requests every configured path from its target over HTTP, timing the time until the response
//! headers arrive (connect) and the time to read the body (transfer), and then runs a path trace to the
//! target. Failed requests are logged and left out; a failed trace leaves an empty output.
//!
//! The path trace is a capability ([Tracer]) so the probe does not depend on how the trace is produced.
//! [Tracepath] runs the `tracepath` command.
//!
mod structs;
mod functions;

pub use structs::*;
pub use functions::*;
