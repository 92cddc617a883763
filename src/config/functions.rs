//! The impls and functions
//!
use std::{path::{Path, PathBuf}, sync::Arc};
use anyhow::{Context, Result};
use log::*;
use tokio::sync::RwLock;
use crate::config::{ConfigStore, GlobalConfig};

/// Read a one-entry-per-line file: lines are trimmed, empty lines are skipped.
/// The read runs on tokio's blocking pool.
pub async fn read_lines(
    path: &Path,
) -> Result<Vec<String>>
{
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Error reading file: {}", path.display()))?;
    Ok(content.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

impl ConfigStore {
    /// Create the store and perform the initial load.
    /// A list that cannot be read starts out empty.
    pub async fn new(
        hosts_file: PathBuf,
        requests_file: PathBuf,
        interval: u64,
    ) -> Self
    {
        let store = ConfigStore {
            hosts_file,
            requests_file,
            current: RwLock::new(Arc::new(GlobalConfig { interval, ..Default::default() })),
        };
        store.reload().await;
        store
    }
    /// Reload both lists and swap in a new snapshot.
    ///
    /// Each list is read independently; a list whose file fails to read keeps its previous value.
    pub async fn reload(&self) -> Arc<GlobalConfig> {
        let previous = self.snapshot().await;

        info!("reading targets from '{}'", self.hosts_file.display());
        let targets = match read_lines(&self.hosts_file).await {
            Ok(targets) => {
                info!("read {} targets", targets.len());
                for (number, target) in targets.iter().enumerate() {
                    info!("\t#{} {}", number + 1, target);
                }
                targets
            },
            Err(e) => {
                error!("{:#}, keeping {} previous targets", e, previous.targets.len());
                previous.targets.clone()
            },
        };

        info!("reading request paths from '{}'", self.requests_file.display());
        let request_paths = match read_lines(&self.requests_file).await {
            Ok(request_paths) => {
                info!("read {} request paths", request_paths.len());
                for (number, path) in request_paths.iter().enumerate() {
                    info!("\t#{} {}", number + 1, path);
                }
                request_paths
            },
            Err(e) => {
                error!("{:#}, keeping {} previous request paths", e, previous.request_paths.len());
                previous.request_paths.clone()
            },
        };

        let fresh = Arc::new(GlobalConfig { targets, request_paths, interval: previous.interval });
        *self.current.write().await = fresh.clone();
        fresh
    }
    pub async fn snapshot(&self) -> Arc<GlobalConfig> {
        self.current.read().await.clone()
    }
}
