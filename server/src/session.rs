//! Per-connection session protocol
//!
//! Each accepted connection runs one [`run_connection`] flow: handshake
//! (init, map, ack), admission, then the steady-state relay loop. The flow is
//! generic over the stream type so the whole state machine can be exercised
//! over in-memory duplex pipes in tests.

use crate::registry::{broadcast_state, SharedRegistry};
use log::{debug, info, warn};
use shared::protocol::{read_frame, ClientFrame, ProtocolError, ServerFrame};
use shared::{MapDefinition, PlayerId, Pose, SPAWN_ANGLE};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{mpsc, watch};

/// Connection lifecycle. A connection only ever moves forward through the
/// handshake, and any state can close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport accepted, id allocated, nothing sent yet.
    Connected,
    /// Init frame with the assigned id is on the wire.
    SentInit,
    /// Map definition is on the wire.
    SentMap,
    /// Blocking for the single ack frame.
    AwaitAck,
    /// Admitted into the world; relaying pose updates.
    Streaming,
    /// Connection torn down.
    Closed,
}

impl SessionState {
    /// Legal forward transitions.
    pub fn permits(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connected, SentInit)
                | (SentInit, SentMap)
                | (SentMap, AwaitAck)
                | (AwaitAck, Streaming)
        ) || (self != Closed && next == Closed)
    }

    fn advance(&mut self, id: PlayerId, next: SessionState) {
        debug_assert!(
            self.permits(next),
            "illegal transition {:?} -> {:?}",
            self,
            next
        );
        debug!("Connection {}: {:?} -> {:?}", id, *self, next);
        *self = next;
    }
}

async fn send<W>(writer: &mut W, frame: &ServerFrame) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = frame.encode()?;
    writer.write_all(&bytes).await?;
    Ok(())
}

/// Removes a player and pushes a corrective broadcast so remaining peers
/// converge. Safe to call from both the reader flow and the writer task; only
/// the call that actually removed the player broadcasts.
pub(crate) async fn evict(registry: &SharedRegistry, id: PlayerId) {
    let removed = { registry.lock().await.remove(id) };
    if removed {
        broadcast_state(registry).await;
    }
}

/// Drains one connection's outbound queue onto its socket. A write failure
/// evicts this peer only; broadcasts to everyone else are unaffected.
async fn write_outbound<W>(
    mut writer: W,
    mut frames: UnboundedReceiver<Vec<u8>>,
    id: PlayerId,
    registry: SharedRegistry,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = frames.recv().await {
        if let Err(err) = writer.write_all(&frame).await {
            warn!("Player {}: send failed ({}), evicting", id, err);
            evict(&registry, id).await;
            break;
        }
    }
    let _ = writer.shutdown().await;
}

/// Runs one connection from accept to close.
///
/// Handshake admission is exactly-once: the id is allocated up front, but the
/// player is inserted nowhere until its ack validates, so a connection that
/// fails the handshake was never visible to anyone.
pub async fn run_connection<S>(
    stream: S,
    registry: SharedRegistry,
    map: Arc<MapDefinition>,
    mut shutdown: watch::Receiver<bool>,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);

    let id = { registry.lock().await.allocate_id() };
    let mut state = SessionState::Connected;
    debug!("Connection {}: {:?}", id, state);

    if let Err(err) = send(&mut writer, &ServerFrame::Init { id }).await {
        warn!("Connection {}: failed to send init ({}), dropping", id, err);
        state.advance(id, SessionState::Closed);
        return;
    }
    state.advance(id, SessionState::SentInit);

    if let Err(err) = send(&mut writer, &ServerFrame::MapData((*map).clone())).await {
        warn!("Connection {}: failed to send map ({}), dropping", id, err);
        state.advance(id, SessionState::Closed);
        return;
    }
    state.advance(id, SessionState::SentMap);
    state.advance(id, SessionState::AwaitAck);

    // Exactly one frame decides admission.
    let ack = tokio::select! {
        _ = shutdown.changed() => None,
        frame = read_frame(&mut reader) => match frame {
            Ok(Some(body)) => ClientFrame::decode(&body).ok(),
            Ok(None) => None,
            Err(_) => None,
        },
    };
    if !matches!(ack, Some(ClientFrame::Ack)) {
        warn!("Connection {}: handshake failed before ack, dropping", id);
        state.advance(id, SessionState::Closed);
        let _ = writer.shutdown().await;
        return;
    }

    // Admission: world entry and peer queue are inserted together under one
    // lock, then everyone (including the new player) gets the grown snapshot.
    let (sender, outbound) = mpsc::unbounded_channel();
    let spawn_pose = Pose::new(map.spawnpoint.0, map.spawnpoint.1, SPAWN_ANGLE);
    {
        registry.lock().await.admit(id, spawn_pose, sender);
    }
    state.advance(id, SessionState::Streaming);
    broadcast_state(&registry).await;

    let writer_task = tokio::spawn(write_outbound(writer, outbound, id, Arc::clone(&registry)));

    loop {
        if *shutdown.borrow_and_update() {
            info!("Player {}: shutdown signal observed", id);
            break;
        }
        let frame = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    // Signal source gone; treat as shutdown.
                    break;
                }
                continue;
            }
            frame = read_frame(&mut reader) => frame,
        };
        match frame {
            Ok(Some(body)) => match ClientFrame::decode(&body) {
                Ok(ClientFrame::Pose(pose)) => {
                    {
                        registry.lock().await.update_pose(id, pose);
                    }
                    broadcast_state(&registry).await;
                }
                Ok(ClientFrame::Ack) => {
                    warn!("Player {}: unexpected ack mid-stream, evicting", id);
                    break;
                }
                Err(err) => {
                    warn!("Player {}: {}, evicting", id, err);
                    break;
                }
            },
            Ok(None) => {
                info!("Player {}: peer closed the connection", id);
                break;
            }
            Err(err) => {
                info!("Player {}: {}, treating as disconnect", id, err);
                break;
            }
        }
    }

    evict(&registry, id).await;
    state.advance(id, SessionState::Closed);
    // The eviction dropped our queue sender, so the writer drains and exits.
    let _ = writer_task.await;
}
