//! The structs
//!
use std::{path::PathBuf, sync::Arc, time::Duration};
use chrono::{DateTime, Local};
use tokio::{net::TcpListener, sync::watch};
use crate::config::ConfigStore;
use crate::registry::Registry;
use crate::store::RecordStore;

/// Nodes not seen for an hour are considered dead.
pub const DEFAULT_DEAD_INTERVAL: u64 = 3600;
/// Cadence of the dead node sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// `address:port` to listen on.
    pub bind: String,
    pub hosts_file: PathBuf,
    pub requests_file: PathBuf,
    pub data_dir: PathBuf,
    /// measurement interval in seconds.
    pub interval: u64,
    /// seconds after which a silent node is evicted.
    pub dead_interval: u64,
    pub table_size: usize,
    pub sweep_interval: Duration,
}

/// State shared by all sessions.
#[derive(Debug)]
pub struct ServerContext {
    pub registry: Registry,
    pub config: ConfigStore,
    pub store: RecordStore,
    pub started: DateTime<Local>,
    pub dead_interval: u64,
    pub(crate) shutdown: watch::Sender<bool>,
}

#[derive(Debug)]
pub struct Server {
    pub(crate) listener: TcpListener,
    pub context: Arc<ServerContext>,
    pub(crate) sweep_interval: Duration,
    pub(crate) shutdown: watch::Receiver<bool>,
}
