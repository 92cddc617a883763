//! The structs
//!
use std::{path::PathBuf, sync::Arc};
use tokio::sync::RwLock;

/// Default measurement interval: 15 minutes.
pub const DEFAULT_INTERVAL: u64 = 15 * 60;

/// One immutable configuration snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalConfig {
    /// target hostnames, optionally `host[:port]|label`.
    pub targets: Vec<String>,
    pub request_paths: Vec<String>,
    /// measurement interval in seconds.
    pub interval: u64,
}

/// The reloadable holder of the current [GlobalConfig].
#[derive(Debug)]
pub struct ConfigStore {
    pub hosts_file: PathBuf,
    pub requests_file: PathBuf,
    pub(crate) current: RwLock<Arc<GlobalConfig>>,
}
