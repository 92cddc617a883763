//! Module for the server side node registry.
//!
//! The registry is a fixed size table of slots. The slot a node occupies determines its phase offset
//! (delta) inside every measurement interval, so nodes in distinct slots never probe at the same instant.
//!
//! [SlotTable] holds the table and its synchronous operations, [Registry] wraps it in a lock and is the
//! only mutation surface the sessions and the dead node sweep use.
//!
mod structs;
mod functions;

pub use structs::*;
