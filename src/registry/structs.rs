//! The structs
//!
use chrono::{DateTime, Local};
use tokio::sync::Mutex;

/// Default number of slots in the table.
pub const DEFAULT_TABLE_SIZE: usize = 1024;

/// A registered node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEntry {
    /// assigned once at first registration, stable across reconnections.
    pub id: String,
    /// last seen peer address.
    pub address: String,
    pub last_seen: DateTime<Local>,
    /// the index of this entry in the table.
    pub slot: usize,
    /// phase offset in seconds, always `slot2time(slot)`.
    pub delta: f64,
    /// identity reported by the node.
    pub hostname: Option<String>,
}

/// The slot table.
#[derive(Debug)]
pub struct SlotTable {
    pub(crate) slots: Vec<Option<NodeEntry>>,
    /// measurement interval in seconds.
    pub interval: u64,
}

/// What happened to a node presenting itself with PLANETLAB.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// the id was found; last seen updated.
    Known(NodeEntry),
    /// the id was unknown and the remembered slot was empty.
    Restored(NodeEntry),
    /// the id was unknown and the remembered slot was taken; a new slot, same id.
    Reassigned(NodeEntry),
}

/// The locked registry shared by all sessions.
#[derive(Debug)]
pub struct Registry {
    pub(crate) table: Mutex<SlotTable>,
}
