//! Ray projection engine
//!
//! Pure function of (map, pose, config, viewport) to an ordered list of wall
//! slices. Rays march across the tile grid in fixed micro-steps; a ray that
//! leaves the map produces no slice, which shows up as a projection gap at
//! grazing angles and is accepted behavior.

use log::warn;
use shared::{MapDefinition, Pose};

/// World units advanced per micro-step.
pub const STEP_SIZE: f32 = 5.0;
/// Micro-step budget per ray; guarantees termination on any input.
pub const MAX_STEPS: u32 = 200;
/// Sentinel for tiles and categories missing from the color map.
pub const FALLBACK_COLOR: [u8; 3] = [255, 0, 255];

const DISTANCE_EPS: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastConfig {
    /// Field of view in degrees.
    pub fov: f32,
    pub num_rays: usize,
    /// Distance at which shading bottoms out.
    pub max_distance: f32,
}

impl Default for RaycastConfig {
    fn default() -> Self {
        Self {
            fov: 80.0,
            num_rays: 120,
            max_distance: 500.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

/// Which face of a wall tile a ray entered through. Screen y grows downward,
/// so a ray moving down the screen comes in through the tile's north face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WallFace {
    North,
    South,
    East,
    West,
}

impl WallFace {
    pub fn shade(self) -> f32 {
        match self {
            WallFace::North => 1.0,
            WallFace::South => 0.8,
            WallFace::East => 0.7,
            WallFace::West => 0.6,
        }
    }

    /// Classifies the crossed face from the previous-to-current tile index
    /// delta. The axis with the larger magnitude wins; ties go to the
    /// vertical (north/south) axis.
    fn from_delta(dx: i32, dy: i32) -> Self {
        if dy.abs() >= dx.abs() {
            if dy < 0 {
                WallFace::South
            } else {
                WallFace::North
            }
        } else if dx > 0 {
            WallFace::West
        } else {
            WallFace::East
        }
    }
}

/// One vertical strip of the projected view.
#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    pub screen_x: f32,
    pub top_y: f32,
    pub bottom_y: f32,
    pub color: [u8; 3],
}

struct RayHit {
    distance: f32,
    face: WallFace,
    tile: u8,
}

/// Base color for a tile id, falling back to the sentinel when the color map
/// has no entry. Degraded rendering, never fatal.
pub fn tile_color(map: &MapDefinition, tile: u8) -> [u8; 3] {
    match map.color_map.get(&tile.to_string()) {
        Some(rgb) => *rgb,
        None => {
            warn!("No color mapped for tile {}, using fallback", tile);
            FALLBACK_COLOR
        }
    }
}

/// Casts the configured fan of rays and returns the ordered slices, leftmost
/// first. Deterministic: identical inputs yield identical output.
pub fn cast_rays(
    map: &MapDefinition,
    pose: &Pose,
    config: &RaycastConfig,
    viewport: &Viewport,
) -> Vec<Slice> {
    let mut slices = Vec::with_capacity(config.num_rays);
    if config.num_rays == 0 {
        return slices;
    }
    let angular_step = config.fov / config.num_rays as f32;
    let column_width = viewport.width / config.num_rays as f32;

    for r in 0..config.num_rays {
        let ray_angle = pose.pa + config.fov / 2.0 - r as f32 * angular_step;
        let Some(hit) = march(map, pose, ray_angle) else {
            continue;
        };

        // Fisheye correction keeps flat walls flat under perspective.
        let corrected = hit.distance * (pose.pa - ray_angle).to_radians().cos();

        let height =
            (map.map_s as f32 * viewport.height / (corrected + DISTANCE_EPS)).min(viewport.height);
        let top_y = (viewport.height - height) / 2.0;

        // The last ray is pinned to the final column so integer rounding can
        // never leave the right edge uncovered.
        let screen_x = if r == config.num_rays - 1 {
            viewport.width - 1.0
        } else {
            r as f32 * column_width
        };

        slices.push(Slice {
            screen_x,
            top_y,
            bottom_y: top_y + height,
            color: shade(map, &hit, corrected, config.max_distance),
        });
    }
    slices
}

/// Marches one ray until it enters a wall tile, leaves the map (no hit), or
/// exhausts the step budget (no hit).
fn march(map: &MapDefinition, pose: &Pose, ray_angle: f32) -> Option<RayHit> {
    let rad = ray_angle.to_radians();
    let (dx, dy) = (rad.cos(), -rad.sin());

    let (mut rx, mut ry) = (pose.px, pose.py);
    let (mut prev_mx, mut prev_my) = map.tile_index_at(rx, ry);

    for _ in 0..MAX_STEPS {
        let (mx, my) = map.tile_index_at(rx, ry);
        let tile = map.tile_at(mx, my)?;
        if tile != 0 {
            let distance = (rx - pose.px).hypot(ry - pose.py);
            return Some(RayHit {
                distance,
                face: WallFace::from_delta(mx - prev_mx, my - prev_my),
                tile,
            });
        }
        prev_mx = mx;
        prev_my = my;
        rx += dx * STEP_SIZE;
        ry += dy * STEP_SIZE;
    }
    None
}

fn shade(map: &MapDefinition, hit: &RayHit, distance: f32, max_distance: f32) -> [u8; 3] {
    let base = tile_color(map, hit.tile);
    let falloff = (1.0 - (distance / max_distance).sqrt()).max(0.7);
    let factor = hit.face.shade() * falloff;
    [
        (base[0] as f32 * factor).clamp(0.0, 255.0) as u8,
        (base[1] as f32 * factor).clamp(0.0, 255.0) as u8,
        (base[2] as f32 * factor).clamp(0.0, 255.0) as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::MapDefinition;
    use std::collections::BTreeMap;

    fn config() -> RaycastConfig {
        RaycastConfig::default()
    }

    fn viewport() -> Viewport {
        Viewport {
            width: 1024.0,
            height: 512.0,
        }
    }

    /// A 5x5 arena fully enclosed by walls.
    fn enclosed_map() -> MapDefinition {
        let mut color_map = BTreeMap::new();
        color_map.insert("1".to_string(), [200, 100, 50]);
        color_map.insert("sky".to_string(), [0, 255, 255]);
        color_map.insert("ground".to_string(), [0, 0, 255]);
        #[rustfmt::skip]
        let grid = vec![
            1, 1, 1, 1, 1,
            1, 0, 0, 0, 1,
            1, 0, 0, 0, 1,
            1, 0, 0, 0, 1,
            1, 1, 1, 1, 1,
        ];
        MapDefinition {
            grid,
            map_x: 5,
            map_y: 5,
            map_s: 64,
            color_map,
            spawnpoint: (160.0, 160.0),
        }
    }

    #[test]
    fn test_projection_is_deterministic() {
        let map = MapDefinition::builtin();
        let pose = Pose::new(150.0, 400.0, 90.0);
        let first = cast_rays(&map, &pose, &config(), &viewport());
        let second = cast_rays(&map, &pose, &config(), &viewport());
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_scenario_central_ray_hit() {
        // 8x8 demo grid, viewer at (150, 400) facing 90 degrees: the central
        // ray runs straight up column 2 and must hit the wall at row 3.
        let map = MapDefinition::builtin();
        let pose = Pose::new(150.0, 400.0, 90.0);

        let hit = march(&map, &pose, 90.0).expect("central ray must hit");
        assert!(hit.distance < 400.0);
        assert_approx_eq!(hit.distance, 145.0, 1e-3);
        // Entered from below: the south face.
        assert_eq!(hit.face, WallFace::South);
        assert_eq!(hit.tile, 1);
    }

    #[test]
    fn test_scenario_central_slice_height() {
        let map = MapDefinition::builtin();
        let pose = Pose::new(150.0, 400.0, 90.0);
        let slices = cast_rays(&map, &pose, &config(), &viewport());

        // Ray 60 of 120 is the central one; its column is 60 * (1024/120).
        let central = slices
            .iter()
            .find(|slice| (slice.screen_x - 512.0).abs() < 1e-3)
            .expect("central slice missing");

        // Hit distance under 400 units means the slice must be taller than
        // a wall projected from 400 units away.
        let min_height = 64.0 * 512.0 / 400.0;
        assert!(central.bottom_y - central.top_y > min_height);

        // Slice is vertically centered.
        assert_approx_eq!(
            central.top_y,
            512.0 - central.bottom_y,
            1e-2
        );
    }

    #[test]
    fn test_boundary_pose_terminates_within_budget() {
        let map = MapDefinition::builtin();
        // Viewer exactly on a tile boundary, rays exactly parallel to grid
        // lines. Must terminate (hit or give up) without spinning.
        let pose = Pose::new(128.0, 384.0, 0.0);
        for angle in [0.0, 90.0, 180.0, 270.0] {
            let _ = march(&map, &pose, angle);
        }
        let slices = cast_rays(&map, &pose, &config(), &viewport());
        assert!(slices.len() <= config().num_rays);
    }

    #[test]
    fn test_viewer_outside_map_yields_no_slices() {
        let map = MapDefinition::builtin();
        let pose = Pose::new(-50.0, -50.0, 45.0);
        assert!(cast_rays(&map, &pose, &config(), &viewport()).is_empty());
    }

    #[test]
    fn test_enclosed_room_covers_full_width() {
        let map = enclosed_map();
        let pose = Pose::new(96.0, 96.0, 0.0);
        let slices = cast_rays(&map, &pose, &config(), &viewport());

        // Every ray hits inside a closed room.
        assert_eq!(slices.len(), config().num_rays);
        // Final ray pinned to the last column.
        assert_approx_eq!(slices.last().unwrap().screen_x, 1023.0, 1e-6);
        assert_approx_eq!(slices[0].screen_x, 0.0, 1e-6);
    }

    #[test]
    fn test_face_classification() {
        assert_eq!(WallFace::from_delta(0, 1), WallFace::North);
        assert_eq!(WallFace::from_delta(0, -1), WallFace::South);
        assert_eq!(WallFace::from_delta(1, 0), WallFace::West);
        assert_eq!(WallFace::from_delta(-1, 0), WallFace::East);
        // Ties resolve to the vertical axis.
        assert_eq!(WallFace::from_delta(1, 1), WallFace::North);
        assert_eq!(WallFace::from_delta(-1, -1), WallFace::South);
    }

    #[test]
    fn test_face_shading_order() {
        assert!(WallFace::North.shade() > WallFace::South.shade());
        assert!(WallFace::South.shade() > WallFace::East.shade());
        assert!(WallFace::East.shade() > WallFace::West.shade());
    }

    #[test]
    fn test_distance_falloff_floors_at_limit() {
        let map = enclosed_map();
        let near = shade(
            &map,
            &RayHit {
                distance: 10.0,
                face: WallFace::North,
                tile: 1,
            },
            10.0,
            500.0,
        );
        let far = shade(
            &map,
            &RayHit {
                distance: 10_000.0,
                face: WallFace::North,
                tile: 1,
            },
            10_000.0,
            500.0,
        );
        // Far walls are darker but never below the 0.7 floor.
        assert!(near[0] > far[0]);
        assert_eq!(far[0], (200.0 * 0.7) as u8);
    }

    #[test]
    fn test_missing_color_uses_sentinel() {
        let mut map = enclosed_map();
        // Tile id 2 has no color entry.
        map.grid[1] = 2;
        assert_eq!(tile_color(&map, 2), FALLBACK_COLOR);

        let pose = Pose::new(96.0, 96.0, 90.0);
        let hit = march(&map, &pose, 90.0).expect("must hit the recolored tile");
        assert_eq!(hit.tile, 2);
        let color = shade(&map, &hit, hit.distance, 500.0);
        // Shaded magenta keeps a zero green channel.
        assert!(color[0] > 0);
        assert_eq!(color[1], 0);
        assert!(color[2] > 0);
    }

    #[test]
    fn test_fisheye_correction_shrinks_oblique_distance() {
        let map = enclosed_map();
        let pose = Pose::new(160.0, 160.0, 0.0);
        let slices = cast_rays(&map, &pose, &config(), &viewport());

        // The wall ahead is flat: corrected heights across the middle of the
        // fan must not vary wildly even though raw distances do.
        let heights: Vec<f32> = slices
            .iter()
            .map(|slice| slice.bottom_y - slice.top_y)
            .collect();
        let mid = heights[heights.len() / 2];
        for height in &heights[40..80] {
            assert!((height - mid).abs() / mid < 0.35);
        }
    }
}
