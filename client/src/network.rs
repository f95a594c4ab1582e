//! Client half of the session protocol
//!
//! The macroquad render loop owns the main thread, so all networking runs on
//! a dedicated thread with a single-threaded tokio runtime: one task reads
//! frames from the server, one task drains the outbound queue. The render
//! loop talks to both through [`ClientNetwork`].

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use shared::protocol::{read_frame, ClientFrame, ServerFrame};
use shared::{MapDefinition, PlayerId, Pose, WorldState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::mpsc;

/// Session lifecycle as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// TCP connect in progress.
    Connecting,
    /// Connected, waiting for the id assignment.
    AwaitInit,
    /// Id recorded, waiting for the map (ack being written).
    AwaitMap,
    /// Ack is on the wire, map still pending.
    AckSent,
    /// Map stored; snapshots flowing.
    Streaming,
    /// Session over, no reconnection.
    Closed,
}

/// The fields the render loop reads every tick. Own id and the latest
/// snapshot are updated under one lock so a tick never observes a
/// half-updated pair.
struct Shared {
    my_id: Option<PlayerId>,
    world: WorldState,
    map: Option<MapDefinition>,
    state: SessionState,
}

/// Handle to the background session. Dropping it closes the session.
pub struct ClientNetwork {
    shared: Arc<Mutex<Shared>>,
    running: Arc<AtomicBool>,
    outbound: Option<UnboundedSender<Vec<u8>>>,
}

impl ClientNetwork {
    /// Connects to the server and spawns the session thread.
    pub fn connect(addr: &str) -> std::io::Result<Self> {
        let stream = std::net::TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;

        let shared = Arc::new(Mutex::new(Shared {
            my_id: None,
            world: WorldState::new(),
            map: None,
            state: SessionState::Connecting,
        }));
        let running = Arc::new(AtomicBool::new(true));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        {
            let shared = Arc::clone(&shared);
            let running = Arc::clone(&running);
            let ack_tx = outbound_tx.clone();
            std::thread::spawn(move || {
                run_worker(stream, shared, running, outbound_rx, ack_tx);
            });
        }

        Ok(Self {
            shared,
            running,
            outbound: Some(outbound_tx),
        })
    }

    /// False once the session has failed or been closed; the render loop
    /// observes this to terminate.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    /// The map, once the handshake has delivered it. Consumers poll this
    /// until it is non-empty before starting simulation.
    pub fn map(&self) -> Option<MapDefinition> {
        self.shared.lock().map.clone()
    }

    /// Own id and the latest snapshot, read as one atomic pair.
    pub fn view(&self) -> (Option<PlayerId>, WorldState) {
        let shared = self.shared.lock();
        (shared.my_id, shared.world.clone())
    }

    /// Queues the local pose for sending. A dead session flips the running
    /// flag instead of raising.
    pub fn send_pose(&self, pose: Pose) {
        if !self.is_running() {
            return;
        }
        let Some(outbound) = &self.outbound else {
            return;
        };
        match ClientFrame::Pose(pose).encode() {
            Ok(frame) => {
                if outbound.send(frame).is_err() {
                    self.running.store(false, Ordering::SeqCst);
                }
            }
            Err(err) => warn!("Failed to encode pose: {}", err),
        }
    }

    /// Ends the session: the outbound queue closes, the writer sends FIN and
    /// the worker thread winds down on its own.
    pub fn close(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.outbound = None;
        self.shared.lock().state = SessionState::Closed;
    }
}

fn run_worker(
    stream: std::net::TcpStream,
    shared: Arc<Mutex<Shared>>,
    running: Arc<AtomicBool>,
    outbound: UnboundedReceiver<Vec<u8>>,
    ack_tx: UnboundedSender<Vec<u8>>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("Failed to start network runtime: {}", err);
            running.store(false, Ordering::SeqCst);
            return;
        }
    };

    runtime.block_on(async move {
        let stream = match TcpStream::from_std(stream) {
            Ok(stream) => stream,
            Err(err) => {
                error!("Failed to register connection: {}", err);
                running.store(false, Ordering::SeqCst);
                return;
            }
        };
        let (reader, writer) = stream.into_split();

        let receive = tokio::spawn(receive_loop(
            reader,
            Arc::clone(&shared),
            Arc::clone(&running),
            ack_tx,
        ));
        let send = tokio::spawn(send_loop(writer, outbound, running));

        let _ = receive.await;
        let _ = send.await;
    });
}

async fn receive_loop(
    mut reader: OwnedReadHalf,
    shared: Arc<Mutex<Shared>>,
    running: Arc<AtomicBool>,
    ack_tx: UnboundedSender<Vec<u8>>,
) {
    shared.lock().state = SessionState::AwaitInit;
    // The ack sender is used exactly once, during the handshake. Dropping it
    // afterwards lets the outbound queue close when the handle goes away.
    let mut ack_tx = Some(ack_tx);

    while running.load(Ordering::SeqCst) {
        match read_frame(&mut reader).await {
            Ok(Some(body)) => match ServerFrame::decode(&body) {
                Ok(ServerFrame::Init { id }) => {
                    info!("Assigned player id {}", id);
                    {
                        let mut shared = shared.lock();
                        shared.my_id = Some(id);
                        shared.state = SessionState::AwaitMap;
                    }
                    // Ack immediately: the id must be known before any
                    // snapshot is meaningfully interpreted.
                    let queued = match (ack_tx.take(), ClientFrame::Ack.encode()) {
                        (Some(tx), Ok(frame)) => tx.send(frame).is_ok(),
                        _ => false,
                    };
                    if !queued {
                        error!("Failed to send ack, closing session");
                        break;
                    }
                    shared.lock().state = SessionState::AckSent;
                    debug!("Sent ack to server");
                }
                Ok(ServerFrame::MapData(map)) => {
                    info!("Received {}x{} map", map.map_x, map.map_y);
                    let mut shared = shared.lock();
                    shared.map = Some(map);
                    shared.state = SessionState::Streaming;
                }
                Ok(ServerFrame::Snapshot(world)) => {
                    debug!("World snapshot: {} players", world.len());
                    shared.lock().world = world;
                }
                Err(err) => {
                    error!("Undecodable frame from server: {}", err);
                    break;
                }
            },
            Ok(None) => {
                warn!("Server disconnected");
                break;
            }
            Err(err) => {
                warn!("Receive failed: {}", err);
                break;
            }
        }
    }

    running.store(false, Ordering::SeqCst);
    shared.lock().state = SessionState::Closed;
}

async fn send_loop(
    mut writer: OwnedWriteHalf,
    mut outbound: UnboundedReceiver<Vec<u8>>,
    running: Arc<AtomicBool>,
) {
    while let Some(frame) = outbound.recv().await {
        if let Err(err) = writer.write_all(&frame).await {
            error!("Send failed (server down?): {}", err);
            running.store(false, Ordering::SeqCst);
            break;
        }
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::protocol::ServerFrame;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::time::{Duration, Instant};

    fn read_exact_frame(stream: &mut std::net::TcpStream) -> Vec<u8> {
        let mut prefix = [0u8; 4];
        stream.read_exact(&mut prefix).unwrap();
        let len = u32::from_be_bytes(prefix) as usize;
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).unwrap();
        body
    }

    fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if check() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_handshake_and_snapshot_flow() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();

            conn.write_all(&ServerFrame::Init { id: 7 }.encode().unwrap())
                .unwrap();

            // The client must answer the init with an ack.
            let ack = read_exact_frame(&mut conn);
            assert_eq!(ClientFrame::decode(&ack).unwrap(), ClientFrame::Ack);

            conn.write_all(
                &ServerFrame::MapData(MapDefinition::builtin())
                    .encode()
                    .unwrap(),
            )
            .unwrap();

            let mut world = WorldState::new();
            world.insert(7, Pose::new(150.0, 400.0, 90.0));
            world.insert(9, Pose::new(64.0, 64.0, 0.0));
            conn.write_all(&ServerFrame::Snapshot(world).encode().unwrap())
                .unwrap();

            // Hold the socket open until the client saw everything.
            let pose = read_exact_frame(&mut conn);
            assert!(matches!(
                ClientFrame::decode(&pose).unwrap(),
                ClientFrame::Pose(_)
            ));
        });

        let mut net = ClientNetwork::connect(&addr.to_string()).unwrap();

        assert!(wait_until(Duration::from_secs(2), || net.map().is_some()));
        assert_eq!(net.map().unwrap(), MapDefinition::builtin());
        assert_eq!(net.state(), SessionState::Streaming);

        assert!(wait_until(Duration::from_secs(2), || {
            let (my_id, world) = net.view();
            my_id == Some(7) && world.len() == 2
        }));

        net.send_pose(Pose::new(200.0, 300.0, 45.0));
        server.join().unwrap();
        net.close();
        assert_eq!(net.state(), SessionState::Closed);
    }

    #[test]
    fn test_server_close_flips_running_flag() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (conn, _) = listener.accept().unwrap();
            drop(conn);
        });

        let net = ClientNetwork::connect(&addr.to_string()).unwrap();
        server.join().unwrap();

        assert!(wait_until(Duration::from_secs(2), || !net.is_running()));
        assert_eq!(net.state(), SessionState::Closed);
    }

    #[test]
    fn test_send_pose_after_close_is_silent() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (conn, _) = listener.accept().unwrap();
            std::thread::sleep(Duration::from_millis(50));
            drop(conn);
        });

        let mut net = ClientNetwork::connect(&addr.to_string()).unwrap();
        net.close();
        // Terminal: no panic, no reconnection attempt.
        net.send_pose(Pose::new(0.0, 0.0, 0.0));
        assert!(!net.is_running());
        server.join().unwrap();
    }
}
