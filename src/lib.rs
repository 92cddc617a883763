//! pingfleet: a coordinating server and a fleet of probe nodes that measure HTTP latency and network paths
//! to a set of targets, each node in its own time slot of the measurement interval.
//!
extern crate serde;
extern crate serde_json;
#[macro_use]
extern crate serde_derive;

pub mod wire;
pub mod transport;
pub mod registry;
pub mod config;
pub mod store;
pub mod server;
pub mod probe;
pub mod node;
pub mod command;
pub mod utility;
