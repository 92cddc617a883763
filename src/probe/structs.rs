//! The structs
//!
use std::{sync::Arc, time::Duration};
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use crate::wire::ProbeResult;

/// Runs a network path trace to a host and returns its output.
#[async_trait]
pub trait Tracer: Send + Sync {
    async fn trace(&self, host: &str) -> Result<String>;
}

/// [Tracer] running `tracepath -n <host>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Tracepath;

/// One target for one interval.
#[derive(Debug, Clone)]
pub struct Probe {
    /// the target as configured, `host[:port][|label]`; also the key in the record.
    pub target: String,
    pub request_paths: Vec<String>,
    /// `local time - server time` in seconds.
    pub clock_offset: f64,
    /// time allowed for every single request.
    pub request_timeout: Duration,
    /// filled in while the probe runs; shared with the scheduler that collects it.
    pub(crate) result: Arc<Mutex<ProbeResult>>,
}
