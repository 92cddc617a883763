//! Module for the probe node.
//!
//! A node registers with the server (HELLO), receives its slot, delta, interval and the targets, and then runs
//! measurement cycles phase aligned on server time: every interval starts `delta` seconds after an interval
//! boundary. At the end of every cycle the collected record is queued and all pending records are uploaded
//! (PLANETLAB); the reply refreshes the configuration for the next cycle.
//!
//! Records stay pending until the server acknowledged them, so they are delivered at least once.
//!
mod structs;
mod functions;
mod scheduler;

pub use structs::*;
pub use scheduler::*;
