//! Render surface: draws the projected scene and the minimap overlay with
//! macroquad.

use crate::minimap::{self, MinimapCell, MinimapMarker, GROUND_CATEGORY, SKY_CATEGORY};
use crate::raycast::{cast_rays, RaycastConfig, Slice, Viewport};
use macroquad::prelude::*;
use shared::{MapDefinition, PlayerId, Pose, WorldState};

/// Heading segment length in multiples of the minimap scale.
const HEADING_SEGMENT: f32 = 5.0;

pub struct Renderer {
    viewport: Viewport,
    config: RaycastConfig,
    minimap_scale: f32,
}

impl Renderer {
    pub fn new(viewport: Viewport, config: RaycastConfig, minimap_scale: f32) -> Self {
        Self {
            viewport,
            config,
            minimap_scale,
        }
    }

    /// Draws one complete frame: background halves, wall slices, minimap.
    pub fn draw_frame(
        &self,
        map: &MapDefinition,
        local: &Pose,
        world: &WorldState,
        my_id: Option<PlayerId>,
    ) {
        self.draw_background(map);

        for slice in cast_rays(map, local, &self.config, &self.viewport) {
            self.draw_slice(&slice);
        }

        for cell in minimap::project_map(map, self.minimap_scale) {
            self.draw_cell(&cell);
        }
        for marker in minimap::project_players(world, my_id, local, map.map_s, self.minimap_scale)
        {
            self.draw_marker(&marker);
        }
    }

    /// Sky fills the top half, ground the bottom half, before any slices.
    fn draw_background(&self, map: &MapDefinition) {
        let half = self.viewport.height / 2.0;
        draw_rectangle(
            0.0,
            0.0,
            self.viewport.width,
            half,
            to_color(minimap::category_color(map, SKY_CATEGORY)),
        );
        draw_rectangle(
            0.0,
            half,
            self.viewport.width,
            half,
            to_color(minimap::category_color(map, GROUND_CATEGORY)),
        );
    }

    fn draw_slice(&self, slice: &Slice) {
        let column_width = (self.viewport.width / self.config.num_rays as f32).ceil();
        draw_rectangle(
            slice.screen_x,
            slice.top_y,
            column_width,
            slice.bottom_y - slice.top_y,
            to_color(slice.color),
        );
    }

    fn draw_cell(&self, cell: &MinimapCell) {
        draw_rectangle(cell.x, cell.y, cell.size, cell.size, to_color(cell.color));
    }

    fn draw_marker(&self, marker: &MinimapMarker) {
        let color = if marker.local { YELLOW } else { RED };
        draw_circle(marker.x, marker.y, self.minimap_scale * 0.75, color);
        let len = HEADING_SEGMENT * self.minimap_scale;
        draw_line(
            marker.x,
            marker.y,
            marker.x + marker.dir_x * len,
            marker.y + marker.dir_y * len,
            1.5,
            color,
        );
    }
}

fn to_color([r, g, b]: [u8; 3]) -> Color {
    Color::from_rgba(r, g, b, 255)
}
