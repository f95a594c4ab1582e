//! Length-prefixed frame codec and the session messages carried in it.
//!
//! A frame is a 4-byte big-endian length followed by that many bytes of UTF-8
//! JSON. The wire carries no message discriminant: each side classifies a
//! payload by which keys are present, so [`ServerFrame`] and [`ClientFrame`]
//! are tagged in code only and decode per receiver role.

use crate::{MapDefinition, PlayerId, Pose, WorldState};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Short length prefix or short body. Callers treat this exactly like a
    /// clean disconnect; it is never retried.
    #[error("framing error: {0}")]
    Framing(&'static str),
    /// Unrecognized or invalid frame shape for the receiver's role.
    #[error("protocol violation: {0}")]
    Violation(String),
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

impl ProtocolError {
    fn invalid_json(err: serde_json::Error) -> Self {
        ProtocolError::Violation(format!("invalid JSON payload: {err}"))
    }
}

/// Serializes a payload into a complete frame: 4-byte big-endian length plus
/// UTF-8 JSON body. No maximum frame size is enforced.
pub fn encode_frame<T: Serialize>(payload: &T) -> Result<Vec<u8>, ProtocolError> {
    let body = serde_json::to_vec(payload).map_err(ProtocolError::invalid_json)?;
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

pub async fn write_frame<W, T>(writer: &mut W, payload: &T) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode_frame(payload)?;
    writer.write_all(&frame).await?;
    Ok(())
}

/// Fills `buf` across partial reads, stopping early on EOF. Returns how many
/// bytes were read before the stream ended.
async fn read_exact_or_eof<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Reads one frame body. `Ok(None)` means the peer shut down cleanly at a
/// frame boundary; a stream that ends mid-prefix or mid-body is a
/// [`ProtocolError::Framing`].
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 4];
    match read_exact_or_eof(reader, &mut prefix).await? {
        0 => return Ok(None),
        4 => {}
        _ => return Err(ProtocolError::Framing("short length prefix")),
    }

    let len = u32::from_be_bytes(prefix) as usize;
    let mut body = vec![0u8; len];
    if read_exact_or_eof(reader, &mut body).await? < len {
        return Err(ProtocolError::Framing("short frame body"));
    }
    Ok(Some(body))
}

/// Messages the server sends. On the wire these are distinguished only by key
/// presence: `init_id`, `map_data`, or a bare world-state object.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    Init { id: PlayerId },
    MapData(MapDefinition),
    Snapshot(WorldState),
}

impl ServerFrame {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        match self {
            ServerFrame::Init { id } => encode_frame(&serde_json::json!({ "init_id": id })),
            ServerFrame::MapData(map) => encode_frame(&serde_json::json!({ "map_data": map })),
            ServerFrame::Snapshot(world) => encode_frame(world),
        }
    }

    /// Client-role decoding: `init_id` wins, then `map_data`, and any other
    /// object is taken to be a world-state snapshot.
    pub fn decode(body: &[u8]) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_slice(body).map_err(ProtocolError::invalid_json)?;
        let Value::Object(obj) = value else {
            return Err(ProtocolError::Violation(
                "payload is not a JSON object".to_string(),
            ));
        };

        if let Some(raw) = obj.get("init_id") {
            let id = raw
                .as_u64()
                .filter(|id| *id > 0 && *id <= u64::from(u32::MAX))
                .ok_or_else(|| ProtocolError::Violation(format!("invalid init_id: {raw}")))?;
            return Ok(ServerFrame::Init {
                id: id as PlayerId,
            });
        }

        if let Some(raw) = obj.get("map_data") {
            let map: MapDefinition =
                serde_json::from_value(raw.clone()).map_err(ProtocolError::invalid_json)?;
            return Ok(ServerFrame::MapData(map));
        }

        let world: WorldState =
            serde_json::from_value(Value::Object(obj)).map_err(ProtocolError::invalid_json)?;
        Ok(ServerFrame::Snapshot(world))
    }
}

/// Messages a client sends: the single handshake ack, then one pose per
/// simulation tick.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    Ack,
    Pose(Pose),
}

impl ClientFrame {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        match self {
            ClientFrame::Ack => encode_frame(&serde_json::json!({ "ack": true })),
            ClientFrame::Pose(pose) => encode_frame(pose),
        }
    }

    /// Server-role decoding: any object carrying an `ack` key is the
    /// handshake ack; everything else must parse as a pose.
    pub fn decode(body: &[u8]) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_slice(body).map_err(ProtocolError::invalid_json)?;
        let Value::Object(obj) = value else {
            return Err(ProtocolError::Violation(
                "payload is not a JSON object".to_string(),
            ));
        };

        if obj.contains_key("ack") {
            return Ok(ClientFrame::Ack);
        }

        let pose: Pose =
            serde_json::from_value(Value::Object(obj)).map_err(ProtocolError::invalid_json)?;
        Ok(ClientFrame::Pose(pose))
    }
}
