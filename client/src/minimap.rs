//! Minimap projector
//!
//! Projects the tile map and every known pose into overlay shapes at a fixed
//! small scale. Pure data out; the render surface draws it.

use crate::raycast::{tile_color, FALLBACK_COLOR};
use log::warn;
use shared::{MapDefinition, PlayerId, Pose, WorldState};

pub const SKY_CATEGORY: &str = "sky";
pub const GROUND_CATEGORY: &str = "ground";

/// One filled map cell.
#[derive(Debug, Clone, PartialEq)]
pub struct MinimapCell {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub color: [u8; 3],
}

/// One player marker: position dot plus a unit heading vector.
#[derive(Debug, Clone, PartialEq)]
pub struct MinimapMarker {
    pub x: f32,
    pub y: f32,
    pub dir_x: f32,
    pub dir_y: f32,
    /// The local player is drawn visually distinct from remotes.
    pub local: bool,
}

/// Category color with the same fail-soft behavior as tile lookups.
pub fn category_color(map: &MapDefinition, category: &str) -> [u8; 3] {
    match map.color_map.get(category) {
        Some(rgb) => *rgb,
        None => {
            warn!("No color mapped for category {:?}, using fallback", category);
            FALLBACK_COLOR
        }
    }
}

/// Projects every tile to a filled cell, `scale` pixels per tile. Void tiles
/// take the ground category color.
pub fn project_map(map: &MapDefinition, scale: f32) -> Vec<MinimapCell> {
    let mut cells = Vec::with_capacity(map.grid.len());
    for my in 0..map.map_y {
        for mx in 0..map.map_x {
            let tile = map.grid[my * map.map_x + mx];
            let color = if tile == 0 {
                category_color(map, GROUND_CATEGORY)
            } else {
                tile_color(map, tile)
            };
            cells.push(MinimapCell {
                x: mx as f32 * scale,
                y: my as f32 * scale,
                size: scale,
                color,
            });
        }
    }
    cells
}

/// Markers for every known pose. The snapshot includes the receiver itself,
/// so its own id is skipped in favor of the fresher local pose.
pub fn project_players(
    world: &WorldState,
    my_id: Option<PlayerId>,
    local: &Pose,
    map_s: u32,
    scale: f32,
) -> Vec<MinimapMarker> {
    let to_minimap = scale / map_s as f32;
    let mut markers: Vec<MinimapMarker> = world
        .iter()
        .filter(|(id, _)| Some(**id) != my_id)
        .map(|(_, pose)| marker(pose, false, to_minimap))
        .collect();
    markers.push(marker(local, true, to_minimap));
    markers
}

fn marker(pose: &Pose, local: bool, to_minimap: f32) -> MinimapMarker {
    let (dir_x, dir_y) = pose.direction();
    MinimapMarker {
        x: pose.px * to_minimap,
        y: pose.py * to_minimap,
        dir_x,
        dir_y,
        local,
    }
}
