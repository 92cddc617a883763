//! The structs
//!
use tokio::net::TcpStream;

/// One connection to a peer.
///
/// `stream` is `None` once the connection is closed.
/// The stream type is generic so sessions can be driven over in-memory pipes in tests.
#[derive(Debug)]
pub struct Connection<S = TcpStream> {
    pub(crate) stream: Option<S>,
    /// pretty printed peer address, used in every log line.
    pub peer: String,
}
