//! The impls and functions
//!
use std::{sync::Arc, time::{Duration, Instant}};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Local;
use log::*;
use tokio::sync::{watch, Mutex};
use crate::probe::{Probe, Tracepath, Tracer};
use crate::utility::epoch_seconds;
use crate::wire::ProbeResult;

#[async_trait]
impl Tracer for Tracepath {
    async fn trace(&self, host: &str) -> Result<String> {
        let output = tokio::process::Command::new("tracepath")
            .arg("-n")
            .arg(host)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Could not run tracepath to {}", host))?;
        if !output.status.success() {
            debug!("tracepath to {} exited with {}", host, output.status);
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Request paths always start with a `/`.
pub fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// The HTTP client for the probes.
///
/// Redirects are not followed, so a 3xx answer counts as a failed request, and no proxy from the
/// environment is used: the timings are those of the target itself.
pub fn probe_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .with_context(|| "Could not build the HTTP client")
}

/// Resolves once `cancel` turns true, or once its sender is gone.
pub async fn cancelled(mut cancel: watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            return;
        }
    }
}

impl Probe {
    /// `budget` is the total time for this target; every request gets `budget / (2 * requests)`.
    pub fn new(
        target: &str,
        request_paths: &[String],
        clock_offset: f64,
        budget: Duration,
    ) -> Self
    {
        let requests = request_paths.len().max(1) as u32;
        Probe {
            target: target.to_string(),
            request_paths: request_paths.to_vec(),
            clock_offset,
            request_timeout: budget / (2 * requests),
            result: Arc::new(Mutex::new(ProbeResult::default())),
        }
    }
    /// The HTTP host (with optional port): the target without its label.
    pub fn http_host(&self) -> &str {
        self.target.split('|').next().unwrap_or_default()
    }
    /// The host to trace: the HTTP host without port.
    pub fn trace_host(&self) -> &str {
        self.http_host().split(':').next().unwrap_or_default()
    }
    /// Request all paths one after the other, then trace the path to the target.
    ///
    /// A trace still running when `cancel` fires is stopped and leaves an empty output.
    pub async fn run(
        &self,
        client: &reqwest::Client,
        tracer: &dyn Tracer,
        cancel: watch::Receiver<bool>,
    )
    {
        debug!("starting probe for {}", self.target);
        // the requests run one after the other; a failed one is left out.
        for request_path in &self.request_paths {
            let request_path = normalize_path(request_path);
            match self.request(client, &request_path).await {
                Ok(times) => {
                    self.result.lock().await.times.insert(request_path, times);
                },
                Err(e) => debug!("error requesting http://{}{}: {:#}", self.http_host(), request_path, e),
            }
        }

        // then the path trace, unless the interval ends first.
        let trace_start = epoch_seconds(Local::now()) - self.clock_offset;
        self.result.lock().await.trace.0 = trace_start;
        tokio::select! {
            output = tracer.trace(self.trace_host()) => match output {
                Ok(output) => self.result.lock().await.trace.1 = output,
                Err(e) => debug!("could not complete path trace: {:#}", e),
            },
            _ = cancelled(cancel) => debug!("path trace to {} stopped at end of interval", self.trace_host()),
        }
    }
    /// One timed GET. Returns `(start, connect duration, transfer duration)`.
    async fn request(
        &self,
        client: &reqwest::Client,
        request_path: &str,
    ) -> Result<(f64, f64, f64)>
    {
        let url = format!("http://{}{}", self.http_host(), request_path);
        let start_time = epoch_seconds(Local::now());
        let timer = Instant::now();

        let response = client.get(&url)
            .timeout(self.request_timeout)
            .send()
            .await?;
        let connected = timer.elapsed();
        let status = response.status();
        if !status.is_success() {
            bail!("{} returned {}", self.target, status);
        }
        let data = response.bytes().await?;
        let finished = timer.elapsed();
        debug!("got {} {} bytes in {:.3}s", url, data.len(), finished.as_secs_f64());

        Ok((
            start_time - self.clock_offset,
            connected.as_secs_f64(),
            (finished - connected).as_secs_f64(),
        ))
    }
    /// A copy of what the probe has measured so far.
    pub async fn collect(&self) -> ProbeResult {
        self.result.lock().await.clone()
    }
}
