//! Helpers for the unit tests: a local HTTP target and canned path tracers.
use std::time::Duration;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use crate::probe::Tracer;

/// Start an HTTP target on localhost and return its `host:port`.
///
/// `/missing*` answers 404, `/moved*` answers 302 to `/ok`, `/slow*` answers 200 after 2 seconds, everything else answers 200 with 1KB.
pub async fn mock_http_target() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut reader = BufReader::new(stream);
                let mut request_line = String::new();
                if reader.read_line(&mut request_line).await.is_err() {
                    return;
                }
                let mut header = String::new();
                while reader.read_line(&mut header).await.map(|n| n > 2).unwrap_or(false) {
                    header.clear();
                }
                let path = request_line.split_whitespace().nth(1).unwrap_or("/").to_string();
                let response = if path.starts_with("/missing") {
                    "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
                } else if path.starts_with("/moved") {
                    "HTTP/1.1 302 Found\r\nLocation: /ok\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
                } else {
                    if path.starts_with("/slow") {
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                    format!("HTTP/1.1 200 OK\r\nContent-Length: 1024\r\nConnection: close\r\n\r\n{}", "x".repeat(1024))
                };
                let mut stream = reader.into_inner();
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });
    address
}

pub struct FixedTracer;

#[async_trait]
impl Tracer for FixedTracer {
    async fn trace(&self, host: &str) -> Result<String> {
        Ok(format!("trace to {}", host))
    }
}

pub struct FailingTracer;

#[async_trait]
impl Tracer for FailingTracer {
    async fn trace(&self, host: &str) -> Result<String> {
        Err(anyhow!("no route to {}", host))
    }
}

pub struct SlowTracer;

#[async_trait]
impl Tracer for SlowTracer {
    async fn trace(&self, host: &str) -> Result<String> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(format!("slow trace to {}", host))
    }
}
