//! The structs
//!
use std::{sync::{atomic::AtomicBool, Arc}, time::Duration};
use tokio::{sync::{watch, Mutex}, task::JoinHandle};
use crate::probe::Tracer;
use crate::wire::{NodeInfo, Record};

/// Delay between two registration attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// What the server assigned to this node.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub info: NodeInfo,
    /// `local time - server time` in seconds, measured at the last exchange.
    pub clock_offset: f64,
}

/// The node side client state.
pub struct Node {
    /// `host:port` of the server.
    pub server: String,
    pub hostname: Option<String>,
    pub(crate) assignment: Mutex<Option<Assignment>>,
    /// records not yet acknowledged by the server.
    pub(crate) records: Mutex<Vec<Record>>,
    /// exchanges with the server run one at a time.
    pub(crate) exchange_lock: Mutex<()>,
    pub(crate) running: AtomicBool,
    pub(crate) tracer: Arc<dyn Tracer>,
    pub(crate) client: reqwest::Client,
}

/// Handle to the running measurement cycles of a node.
#[derive(Debug)]
pub struct Scheduler {
    pub(crate) stop: watch::Sender<bool>,
    pub(crate) task: JoinHandle<()>,
}
