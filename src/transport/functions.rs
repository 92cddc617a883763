//! The impls and functions
//!
use std::net::SocketAddr;
use log::*;
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use crate::transport::Connection;
use crate::wire::{self, Command, WireError};

impl Connection<TcpStream> {
    /// Connect to `address` (`host:port`).
    /// A failed connect yields a closed connection, which the caller must check with [Connection::is_connected].
    pub async fn connect(
        address: &str,
    ) -> Connection<TcpStream>
    {
        match TcpStream::connect(address).await {
            Ok(stream) => {
                debug!("connected to {}", address);
                Connection { stream: Some(stream), peer: address.to_string() }
            },
            Err(e) => {
                warn!("could not connect to {}: {}", address, e);
                Connection { stream: None, peer: address.to_string() }
            },
        }
    }
    pub fn accepted(
        stream: TcpStream,
        peer: SocketAddr,
    ) -> Connection<TcpStream>
    {
        Connection::new(stream, peer.to_string())
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    pub fn new(
        stream: S,
        peer: String,
    ) -> Self
    {
        Connection { stream: Some(stream), peer }
    }
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
    /// Shut down and drop the stream. Closing twice is fine.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!("shutdown of connection to {} failed: {}", self.peer, e);
            }
        }
    }
    async fn fail(
        &mut self,
        phase: &str,
        error: WireError,
    )
    {
        match error {
            WireError::PeerClosed => debug!("{} closed the connection during {}", self.peer, phase),
            other => warn!("{} with {} failed: {}", phase, self.peer, other),
        }
        self.close().await;
    }
    pub async fn send_command(
        &mut self,
        command: Command,
    )
    {
        let Some(stream) = self.stream.as_mut() else { return };
        let result = wire::write_command(stream, command).await;
        if let Err(e) = result {
            self.fail(&format!("send command {}", command), e).await;
        }
    }
    /// Returns `None` when the connection is (or becomes) closed.
    pub async fn recv_command(&mut self) -> Option<Command> {
        let stream = self.stream.as_mut()?;
        let result = wire::read_command(stream).await;
        match result {
            Ok(command) => Some(command),
            Err(e) => {
                self.fail("receive command", e).await;
                None
            },
        }
    }
    pub async fn send_object<T: Serialize>(
        &mut self,
        value: &T,
    )
    {
        let Some(stream) = self.stream.as_mut() else { return };
        let result = wire::write_object(stream, value).await;
        if let Err(e) = result {
            self.fail("send object", e).await;
        }
    }
    /// Returns `None` when the connection is (or becomes) closed, or the frame did not decode.
    pub async fn recv_object<T: DeserializeOwned>(&mut self) -> Option<T> {
        let stream = self.stream.as_mut()?;
        let result = wire::read_object(stream).await;
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.fail("receive object", e).await;
                None
            },
        }
    }
}
