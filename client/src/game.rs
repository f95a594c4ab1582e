//! Local player simulation
//!
//! The local pose is owned and mutated here only; everyone else sees it
//! through the server's snapshots. Movement matches the original tuning:
//! 200 units/s forward, 360 degrees/s rotation, and a move is taken only if
//! the destination tile is clear.

use shared::{normalize_angle, MapDefinition, Pose, MOVE_SPEED, SPAWN_ANGLE, TURN_SPEED};

/// Which configured movement actions are currently held.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeldActions {
    pub forward: bool,
    pub backward: bool,
    pub turn_left: bool,
    pub turn_right: bool,
}

pub struct LocalPlayer {
    pose: Pose,
    dir: (f32, f32),
}

impl LocalPlayer {
    pub fn new(x: f32, y: f32, angle: f32) -> Self {
        let pose = Pose::new(x, y, angle);
        let dir = pose.direction();
        Self { pose, dir }
    }

    pub fn at_spawn(map: &MapDefinition) -> Self {
        Self::new(map.spawnpoint.0, map.spawnpoint.1, SPAWN_ANGLE)
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Advances one simulation tick.
    pub fn advance(&mut self, map: &MapDefinition, held: HeldActions, dt: f32) {
        if held.turn_left {
            self.pose.pa = normalize_angle(self.pose.pa + TURN_SPEED * dt);
            self.dir = self.pose.direction();
        }
        if held.turn_right {
            self.pose.pa = normalize_angle(self.pose.pa - TURN_SPEED * dt);
            self.dir = self.pose.direction();
        }

        let step = MOVE_SPEED * dt;
        let mut nx = self.pose.px;
        let mut ny = self.pose.py;
        if held.forward {
            nx += self.dir.0 * step;
            ny += self.dir.1 * step;
        }
        if held.backward {
            nx -= self.dir.0 * step;
            ny -= self.dir.1 * step;
        }

        // Walls stop the move entirely; out of bounds counts as a wall.
        let (mx, my) = map.tile_index_at(nx, ny);
        if !map.is_wall(mx, my) {
            self.pose.px = nx;
            self.pose.py = ny;
        }
    }
}
