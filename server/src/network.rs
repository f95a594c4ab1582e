//! TCP listener and cooperative shutdown for the relay server
//!
//! The accept loop and every connection flow share one shutdown signal, a
//! watch channel. On shutdown the listening socket closes first, then the
//! server waits for every connection to observe the signal at its next read
//! boundary, so shutdown latency is bounded by one in-flight broadcast.

use crate::registry::{Registry, SharedRegistry};
use crate::session;
use log::{error, info};
use shared::MapDefinition;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;

/// Flips the shared shutdown signal. Cloneable into signal handlers and
/// tests; the server observes it within one accept poll.
#[derive(Clone)]
pub struct ShutdownHandle {
    signal: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.signal.send(true);
    }
}

/// Relay server: owns the listener, the shared registry and the shutdown
/// signal.
pub struct Server {
    listener: TcpListener,
    registry: SharedRegistry,
    map: Arc<MapDefinition>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Server {
    pub async fn bind(addr: &str, map: MapDefinition) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            listener,
            registry: Arc::new(Mutex::new(Registry::new())),
            map: Arc::new(map),
            shutdown: Arc::new(shutdown),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            signal: Arc::clone(&self.shutdown),
        }
    }

    /// Accepts connections until the shutdown signal flips, then closes the
    /// listener and waits for every connection flow to exit.
    pub async fn run(self) -> std::io::Result<()> {
        let Server {
            listener,
            registry,
            map,
            shutdown,
        } = self;

        info!("Server listening on {}", listener.local_addr()?);
        let mut shutdown_rx = shutdown.subscribe();
        let mut connections = JoinSet::new();

        loop {
            if *shutdown_rx.borrow_and_update() {
                break;
            }
            tokio::select! {
                _ = shutdown_rx.changed() => continue,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        info!("Accepted connection from {}", addr);
                        connections.spawn(session::run_connection(
                            stream,
                            Arc::clone(&registry),
                            Arc::clone(&map),
                            shutdown.subscribe(),
                        ));
                    }
                    Err(err) => {
                        error!("Accept failed: {}", err);
                    }
                },
            }
        }

        // Stop admitting before draining: close the listening socket, then
        // let every connection observe the signal and exit.
        drop(listener);
        info!(
            "Listener closed, waiting for {} active connections",
            connections.len()
        );
        while connections.join_next().await.is_some() {}
        info!("All connections closed");
        Ok(())
    }
}
