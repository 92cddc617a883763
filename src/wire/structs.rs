//! The structs
//!
use std::collections::BTreeMap;

/// The one-byte commands.
///
/// The numeric codes are the wire contract, so never renumber these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Refresh = 0x01,
    Shutdown = 0x02,
    Hello = 0x04,
    Planetlab = 0x08,
    Ok = 0x16,
    Error = 0x32,
    Status = 0x64,
}

/// The errors of the wire layer.
///
/// The transport maps all of these onto a closed connection.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("peer closed the connection")]
    PeerClosed,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zlib error: {0}")]
    Compression(std::io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("unknown command byte: {0:#04x}")]
    UnknownCommand(u8),
}

/// Sent by a node with [Command::Hello].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HelloGreeting {
    pub hostname: Option<String>,
}

/// Sent by a node with [Command::Planetlab].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanetlabGreeting {
    pub id: String,
    pub slot: usize,
    pub hostname: Option<String>,
}

/// The server reply to both HELLO and PLANETLAB.
///
/// This is everything a node needs to arm its measurement cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: String,
    pub slot: usize,
    /// phase offset in seconds after each interval boundary.
    pub delta: f64,
    /// measurement interval in seconds.
    pub interval: u64,
    /// server time in epoch seconds.
    pub now: f64,
    pub targets: Vec<String>,
    #[serde(rename = "requestPaths")]
    pub request_paths: Vec<String>,
}

/// The results of probing one target during one interval.
///
/// `times` maps a request path to `[start, connect duration, transfer duration]`,
/// `trace` is `[start, path trace output]`.
/// All start values are server-relative epoch seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub times: BTreeMap<String, (f64, f64, f64)>,
    pub trace: (f64, String),
}

/// One interval of measurements: target name to its result.
pub type Record = BTreeMap<String, ProbeResult>;

/// Sent by a node after the server acknowledged its PLANETLAB greeting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataUpload {
    pub records: Vec<Record>,
}
