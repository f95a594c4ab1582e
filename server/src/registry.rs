//! Connection registry and authoritative world state for the relay server
//!
//! This module owns the two registries every connection flow touches:
//! - the world state (player id -> latest pose), which is what gets broadcast
//! - the peer table (player id -> outbound frame queue), which is where
//!   broadcasts are delivered
//!
//! Both live in one [`Registry`] value behind one lock. That is deliberate:
//! admission and eviction must mutate the pair atomically, so a player can
//! never be visible in the world without a live connection or vice versa.

use log::{debug, error, info};
use shared::protocol::ServerFrame;
use shared::{PlayerId, Pose, WorldState};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;

/// Outbound queue handle for one connection. Frames pushed here are written
/// to the socket by that connection's writer task.
pub type FrameSender = UnboundedSender<Vec<u8>>;

/// Registry shared by the accept loop and every connection flow.
pub type SharedRegistry = Arc<Mutex<Registry>>;

/// Tracks connected players and their authoritative poses.
///
/// Ids are handed out by a monotonic counter starting at 1 and are never
/// reused, even after a disconnect.
pub struct Registry {
    next_id: PlayerId,
    peers: HashMap<PlayerId, FrameSender>,
    world: WorldState,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            peers: HashMap::new(),
            world: WorldState::new(),
        }
    }

    /// Reserves the next player id. The id is allocated before the handshake
    /// completes but nothing becomes visible until [`Registry::admit`].
    pub fn allocate_id(&mut self) -> PlayerId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Admits an acknowledged connection: inserts the world entry and the
    /// peer queue together. Called exactly once per connection, only after
    /// its ack has been validated.
    pub fn admit(&mut self, id: PlayerId, pose: Pose, sender: FrameSender) {
        self.world.insert(id, pose);
        self.peers.insert(id, sender);
        info!("Player {} joined at ({:.0}, {:.0})", id, pose.px, pose.py);
    }

    /// Removes a player from the world and the peer table together. Returns
    /// false if the player was already gone, making eviction idempotent when
    /// the reader and writer sides race to report the same failure.
    pub fn remove(&mut self, id: PlayerId) -> bool {
        let had_pose = self.world.remove(&id).is_some();
        let had_peer = self.peers.remove(&id).is_some();
        if had_pose || had_peer {
            info!("Player {} disconnected", id);
        }
        had_pose || had_peer
    }

    /// Overwrites a streaming player's pose. Ignored for unknown ids (the
    /// player may have just been evicted by the other half of its connection).
    pub fn update_pose(&mut self, id: PlayerId, pose: Pose) -> bool {
        match self.world.get_mut(&id) {
            Some(entry) => {
                *entry = pose;
                true
            }
            None => false,
        }
    }

    /// Clone of the current world state.
    pub fn snapshot(&self) -> WorldState {
        self.world.clone()
    }

    /// Encodes the current world as one snapshot frame. The world is a
    /// BTreeMap, so identical states always produce identical bytes.
    pub fn encode_snapshot(&self) -> Result<Vec<u8>, shared::ProtocolError> {
        ServerFrame::Snapshot(self.world.clone()).encode()
    }

    /// Snapshot of broadcast targets, taken so a concurrent disconnect can
    /// never corrupt an in-flight delivery iteration.
    pub fn broadcast_targets(&self) -> Vec<(PlayerId, FrameSender)> {
        self.peers
            .iter()
            .map(|(id, sender)| (*id, sender.clone()))
            .collect()
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.world.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Pushes the current world state to every streaming connection.
///
/// The snapshot is encoded once under the lock; delivery happens outside it.
/// A closed queue just means that peer is already tearing itself down, so it
/// is skipped without disturbing delivery to the others.
pub async fn broadcast_state(registry: &SharedRegistry) {
    let (frame, targets) = {
        let reg = registry.lock().await;
        let frame = match reg.encode_snapshot() {
            Ok(frame) => frame,
            Err(err) => {
                error!("Failed to encode state snapshot: {}", err);
                return;
            }
        };
        (frame, reg.broadcast_targets())
    };

    for (id, sender) in targets {
        if sender.send(frame.clone()).is_err() {
            debug!("Player {} outbound queue closed, skipping", id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::protocol::ServerFrame;
    use tokio::sync::mpsc;

    fn queue() -> (FrameSender, mpsc::UnboundedReceiver<Vec<u8>>) {
        mpsc::unbounded_channel()
    }

    fn pose() -> Pose {
        Pose::new(150.0, 400.0, 90.0)
    }

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let mut registry = Registry::new();
        assert_eq!(registry.allocate_id(), 1);
        assert_eq!(registry.allocate_id(), 2);
        assert_eq!(registry.allocate_id(), 3);
    }

    #[test]
    fn test_ids_never_reused_after_removal() {
        let mut registry = Registry::new();
        let first = registry.allocate_id();
        let (tx, _rx) = queue();
        registry.admit(first, pose(), tx);
        registry.remove(first);

        let second = registry.allocate_id();
        assert_eq!(second, 2);
        assert!(second > first);
    }

    #[test]
    fn test_admit_and_remove_are_paired() {
        let mut registry = Registry::new();
        let id = registry.allocate_id();
        let (tx, _rx) = queue();

        registry.admit(id, pose(), tx);
        assert!(registry.contains(id));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.snapshot().len(), 1);

        assert!(registry.remove(id));
        assert!(!registry.contains(id));
        assert!(registry.is_empty());
        assert!(registry.snapshot().is_empty());

        // Second removal is a no-op.
        assert!(!registry.remove(id));
    }

    #[test]
    fn test_allocated_but_unadmitted_id_is_invisible() {
        let mut registry = Registry::new();
        let id = registry.allocate_id();
        assert!(!registry.contains(id));
        assert!(registry.snapshot().is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_update_pose_only_for_admitted_players() {
        let mut registry = Registry::new();
        let id = registry.allocate_id();
        assert!(!registry.update_pose(id, pose()));

        let (tx, _rx) = queue();
        registry.admit(id, pose(), tx);
        let moved = Pose::new(10.0, 20.0, 180.0);
        assert!(registry.update_pose(id, moved));
        assert_eq!(registry.snapshot().get(&id), Some(&moved));
    }

    #[test]
    fn test_snapshot_encoding_is_byte_identical() {
        let mut registry = Registry::new();
        let (tx1, _rx1) = queue();
        let (tx2, _rx2) = queue();
        let a = registry.allocate_id();
        registry.admit(a, pose(), tx1);
        let b = registry.allocate_id();
        registry.admit(b, Pose::new(1.0, 2.0, 3.0), tx2);

        let first = registry.encode_snapshot().unwrap();
        let second = registry.encode_snapshot().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_scenario_three_admissions() {
        let mut registry = Registry::new();
        let mut keep = Vec::new();
        for _ in 0..3 {
            let id = registry.allocate_id();
            let (tx, rx) = queue();
            keep.push(rx);
            registry.admit(id, pose(), tx);
        }

        let ids: Vec<PlayerId> = registry.snapshot().keys().copied().collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_peer() {
        let registry: SharedRegistry = Arc::new(Mutex::new(Registry::new()));
        let (tx1, mut rx1) = queue();
        let (tx2, mut rx2) = queue();
        {
            let mut reg = registry.lock().await;
            let a = reg.allocate_id();
            reg.admit(a, pose(), tx1);
            let b = reg.allocate_id();
            reg.admit(b, pose(), tx2);
        }

        broadcast_state(&registry).await;

        let frame1 = rx1.try_recv().unwrap();
        let frame2 = rx2.try_recv().unwrap();
        assert_eq!(frame1, frame2);

        match ServerFrame::decode(&frame1[4..]).unwrap() {
            ServerFrame::Snapshot(world) => {
                assert_eq!(world.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_broadcast_skips_closed_queue() {
        let registry: SharedRegistry = Arc::new(Mutex::new(Registry::new()));
        let (tx1, rx1) = queue();
        let (tx2, mut rx2) = queue();
        {
            let mut reg = registry.lock().await;
            let a = reg.allocate_id();
            reg.admit(a, pose(), tx1);
            let b = reg.allocate_id();
            reg.admit(b, pose(), tx2);
        }

        // Peer 1's writer is gone; delivery to peer 2 must still happen.
        drop(rx1);
        broadcast_state(&registry).await;
        assert!(rx2.try_recv().is_ok());
    }
}
