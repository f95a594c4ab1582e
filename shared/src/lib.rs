use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod map;
pub mod protocol;

pub use map::MapDefinition;
pub use protocol::{ClientFrame, ProtocolError, ServerFrame};

pub const MOVE_SPEED: f32 = 200.0;
pub const TURN_SPEED: f32 = 360.0;
pub const SPAWN_ANGLE: f32 = 90.0;

/// Server-assigned connection identity. Positive, strictly increasing for the
/// life of the server process, never reused.
pub type PlayerId = u32;

/// Authoritative mapping from player identity to latest pose. A BTreeMap so
/// snapshots always enumerate in ascending id order and identical states
/// serialize to identical bytes.
pub type WorldState = BTreeMap<PlayerId, Pose>;

/// A player's position and facing angle. Wire field names are fixed by the
/// protocol: `px`, `py`, `pa`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Pose {
    pub px: f32,
    pub py: f32,
    pub pa: f32,
}

impl Pose {
    pub fn new(px: f32, py: f32, pa: f32) -> Self {
        Self {
            px,
            py,
            pa: normalize_angle(pa),
        }
    }

    /// Copy of this pose with the angle folded into [0, 360).
    pub fn normalized(self) -> Self {
        Self {
            pa: normalize_angle(self.pa),
            ..self
        }
    }

    /// Unit heading vector. Screen y grows downward, so a 90 degree angle
    /// points up.
    pub fn direction(&self) -> (f32, f32) {
        let rad = self.pa.to_radians();
        (rad.cos(), -rad.sin())
    }
}

/// Folds an angle in degrees into [0, 360).
pub fn normalize_angle(angle: f32) -> f32 {
    angle.rem_euclid(360.0)
}
