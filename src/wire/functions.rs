//! The impls and functions
//!
use std::io::{Read, Write};
use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use crate::wire::{Command, WireError};

/// Size of the big-endian length prefix in front of every object frame.
pub const LENGTH_PREFIX_SIZE: usize = 4;

impl Command {
    pub fn code(self) -> u8 {
        self as u8
    }
    pub fn name(self) -> &'static str {
        match self {
            Command::Refresh => "REFRESH",
            Command::Shutdown => "SHUTDOWN",
            Command::Hello => "HELLO",
            Command::Planetlab => "PLANETLAB",
            Command::Ok => "OK",
            Command::Error => "ERROR",
            Command::Status => "STATUS",
        }
    }
    /// The commands an operator can send with the admin tool.
    pub fn from_admin_name(name: &str) -> Option<Command> {
        match name.to_uppercase().as_str() {
            "REFRESH" => Some(Command::Refresh),
            "SHUTDOWN" => Some(Command::Shutdown),
            "STATUS" => Some(Command::Status),
            _ => None,
        }
    }
}

impl TryFrom<u8> for Command {
    type Error = WireError;

    fn try_from(byte: u8) -> Result<Self, WireError> {
        match byte {
            0x01 => Ok(Command::Refresh),
            0x02 => Ok(Command::Shutdown),
            0x04 => Ok(Command::Hello),
            0x08 => Ok(Command::Planetlab),
            0x16 => Ok(Command::Ok),
            0x32 => Ok(Command::Error),
            0x64 => Ok(Command::Status),
            other => Err(WireError::UnknownCommand(other)),
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Serialize a value as msgpack (with named fields), then zlib compress it.
pub fn encode_payload<T: Serialize>(
    value: &T,
) -> Result<Vec<u8>, WireError>
{
    let packed = rmp_serde::to_vec_named(value)?;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&packed).map_err(WireError::Compression)?;
    encoder.finish().map_err(WireError::Compression)
}

/// Reverse of [encode_payload].
pub fn decode_payload<T: DeserializeOwned>(
    payload: &[u8],
) -> Result<T, WireError>
{
    let mut packed = Vec::new();
    ZlibDecoder::new(payload).read_to_end(&mut packed).map_err(WireError::Compression)?;
    Ok(rmp_serde::from_slice(&packed)?)
}

/// Build a complete frame: length prefix followed by the compressed payload.
pub fn encode_frame<T: Serialize>(
    value: &T,
) -> Result<Vec<u8>, WireError>
{
    let payload = encode_payload(value)?;
    let length = u32::try_from(payload.len())
        .map_err(|_| WireError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, "frame exceeds 4GB")))?;
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    frame.extend_from_slice(&length.to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

pub async fn write_command<W: AsyncWrite + Unpin>(
    writer: &mut W,
    command: Command,
) -> Result<(), WireError>
{
    writer.write_all(&[command.code()]).await?;
    writer.flush().await?;
    Ok(())
}

/// Read exactly one command byte.
/// Zero bytes read means the peer closed the connection.
pub async fn read_command<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Command, WireError>
{
    let mut byte = [0_u8; 1];
    if reader.read(&mut byte).await? == 0 {
        return Err(WireError::PeerClosed);
    }
    Command::try_from(byte[0])
}

pub async fn write_object<W: AsyncWrite + Unpin, T: Serialize>(
    writer: &mut W,
    value: &T,
) -> Result<(), WireError>
{
    let frame = encode_frame(value)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one object frame.
///
/// The payload is accumulated over as many socket reads as needed;
/// the buffer grows with the data actually received, not with the announced length.
pub async fn read_object<R: AsyncRead + Unpin, T: DeserializeOwned>(
    reader: &mut R,
) -> Result<T, WireError>
{
    let mut prefix = [0_u8; LENGTH_PREFIX_SIZE];
    reader.read_exact(&mut prefix).await.map_err(eof_is_peer_closed)?;
    let length = u32::from_be_bytes(prefix) as u64;

    let mut payload = Vec::new();
    (&mut *reader).take(length).read_to_end(&mut payload).await?;
    if (payload.len() as u64) < length {
        return Err(WireError::PeerClosed);
    }
    decode_payload(&payload)
}

fn eof_is_peer_closed(error: std::io::Error) -> WireError {
    if error.kind() == std::io::ErrorKind::UnexpectedEof {
        WireError::PeerClosed
    } else {
        WireError::Io(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{DataUpload, NodeInfo, ProbeResult, Record};
    use serde_json::json;

    #[test]
    fn unit_command_codes_match_wire_contract() {
        let codes: Vec<u8> = [
            Command::Refresh,
            Command::Shutdown,
            Command::Hello,
            Command::Planetlab,
            Command::Ok,
            Command::Error,
            Command::Status,
        ].iter().map(|c| c.code()).collect();
        assert_eq!(codes, vec![0x01, 0x02, 0x04, 0x08, 0x16, 0x32, 0x64]);
        for code in codes {
            assert_eq!(Command::try_from(code).unwrap().code(), code);
        }
    }

    #[test]
    fn unit_unknown_command_byte() {
        assert!(matches!(Command::try_from(0x03), Err(WireError::UnknownCommand(0x03))));
    }

    #[test]
    fn unit_admin_names() {
        assert_eq!(Command::from_admin_name("status"), Some(Command::Status));
        assert_eq!(Command::from_admin_name("REFRESH"), Some(Command::Refresh));
        assert_eq!(Command::from_admin_name("HELLO"), None);
    }

    #[test]
    fn unit_payload_nested_values() {
        let value = json!({
            "name": "node-1",
            "list": [1, -5, 2.5, "text", [true, null], {"inner": {"deeper": [0.125]}}],
            "empty_map": {},
            "empty_list": [],
        });
        let payload = encode_payload(&value).unwrap();
        let decoded: serde_json::Value = decode_payload(&payload).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn unit_payload_node_info_uses_wire_key_names() {
        let info = NodeInfo {
            id: "abc".to_string(),
            slot: 512,
            delta: 450.0,
            interval: 900,
            now: 1_700_000_000.5,
            targets: vec!["a.example.com".to_string()],
            request_paths: vec!["/index.html".to_string()],
        };
        let payload = encode_payload(&info).unwrap();
        let as_value: serde_json::Value = decode_payload(&payload).unwrap();
        assert_eq!(as_value["requestPaths"], json!(["/index.html"]));
        assert_eq!(as_value["interval"], json!(900));
        let decoded: NodeInfo = decode_payload(&payload).unwrap();
        assert_eq!(decoded, info);
    }

    #[test]
    fn unit_payload_record_shape() {
        let mut result = ProbeResult::default();
        result.times.insert("/1k".to_string(), (10.0, 0.25, 0.5));
        result.trace = (11.0, " 1:  10.0.0.1  0.3ms".to_string());
        let mut record = Record::new();
        record.insert("t1".to_string(), result);
        let upload = DataUpload { records: vec![record] };

        let payload = encode_payload(&upload).unwrap();
        let as_value: serde_json::Value = decode_payload(&payload).unwrap();
        assert_eq!(as_value["records"][0]["t1"]["times"]["/1k"], json!([10.0, 0.25, 0.5]));
        assert_eq!(as_value["records"][0]["t1"]["trace"][0], json!(11.0));
    }

    #[test]
    fn unit_payload_garbage_is_an_error() {
        let result: Result<NodeInfo, WireError> = decode_payload(b"definitely not zlib");
        assert!(matches!(result, Err(WireError::Compression(_))));
    }

    #[test]
    fn unit_payload_foreign_shape_is_an_error() {
        let payload = encode_payload(&json!({"unrelated": 1})).unwrap();
        let result: Result<NodeInfo, WireError> = decode_payload(&payload);
        assert!(matches!(result, Err(WireError::Decode(_))));
    }

    #[test]
    fn unit_frame_has_big_endian_length() {
        let frame = encode_frame(&json!({"hostname": "x"})).unwrap();
        let length = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(length, frame.len() - LENGTH_PREFIX_SIZE);
    }

    #[tokio::test]
    async fn unit_read_object_accumulates_partial_reads() {
        let (mut client, mut server) = tokio::io::duplex(16);
        let value = json!({"records": (0..200).map(|i| json!({"t": i})).collect::<Vec<_>>()});
        let frame = encode_frame(&value).unwrap();

        let writer = tokio::spawn(async move {
            for chunk in frame.chunks(7) {
                client.write_all(chunk).await.unwrap();
                tokio::task::yield_now().await;
            }
        });
        let decoded: serde_json::Value = read_object(&mut server).await.unwrap();
        writer.await.unwrap();
        assert_eq!(decoded, value);
    }

    #[tokio::test]
    async fn unit_read_object_short_length_prefix() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[0, 0]).await.unwrap();
        drop(client);
        let result: Result<serde_json::Value, WireError> = read_object(&mut server).await;
        assert!(matches!(result, Err(WireError::PeerClosed)));
    }

    #[tokio::test]
    async fn unit_read_object_peer_closes_mid_payload() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let frame = encode_frame(&json!({"hostname": "a-long-enough-hostname"})).unwrap();
        client.write_all(&frame[..frame.len() - 3]).await.unwrap();
        drop(client);
        let result: Result<serde_json::Value, WireError> = read_object(&mut server).await;
        assert!(matches!(result, Err(WireError::PeerClosed)));
    }

    #[tokio::test]
    async fn unit_read_command_on_closed_stream() {
        let (client, mut server) = tokio::io::duplex(8);
        drop(client);
        assert!(matches!(read_command(&mut server).await, Err(WireError::PeerClosed)));
    }

    #[tokio::test]
    async fn unit_command_then_object_on_one_stream() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        write_command(&mut client, Command::Hello).await.unwrap();
        write_object(&mut client, &json!({"hostname": "n1"})).await.unwrap();
        assert_eq!(read_command(&mut server).await.unwrap(), Command::Hello);
        let greeting: crate::wire::HelloGreeting = read_object(&mut server).await.unwrap();
        assert_eq!(greeting.hostname.as_deref(), Some("n1"));
    }
}
