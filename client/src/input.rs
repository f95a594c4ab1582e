//! Key-state provider: maps the configured movement bindings onto macroquad's
//! per-frame key state.

use crate::game::HeldActions;
use macroquad::input::{is_key_down, KeyCode};

/// Movement key bindings, WASD by default.
#[derive(Debug, Clone, Copy)]
pub struct Bindings {
    pub forward: KeyCode,
    pub backward: KeyCode,
    pub turn_left: KeyCode,
    pub turn_right: KeyCode,
}

impl Default for Bindings {
    fn default() -> Self {
        Self {
            forward: KeyCode::W,
            backward: KeyCode::S,
            turn_left: KeyCode::A,
            turn_right: KeyCode::D,
        }
    }
}

/// Samples which configured actions are currently held. Called once per
/// frame from the render loop.
pub fn held_actions(bindings: &Bindings) -> HeldActions {
    HeldActions {
        forward: is_key_down(bindings.forward),
        backward: is_key_down(bindings.backward),
        turn_left: is_key_down(bindings.turn_left),
        turn_right: is_key_down(bindings.turn_right),
    }
}
