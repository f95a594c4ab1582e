//! Static tile map shared by the server (authoritative copy, broadcast once
//! per connection) and the client (collision, projection, minimap).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MapError {
    #[error("grid has {got} tiles, expected {width}x{height}")]
    GridSize {
        width: usize,
        height: usize,
        got: usize,
    },
    #[error("map dimensions must be nonzero")]
    EmptyDimensions,
    #[error("failed to read map file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse map file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Immutable map definition. Field renames pin the wire shape the map editor
/// writes and every client expects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MapDefinition {
    /// Row-major tile ids, 0 = walkable.
    pub grid: Vec<u8>,
    #[serde(rename = "mapX")]
    pub map_x: usize,
    #[serde(rename = "mapY")]
    pub map_y: usize,
    /// Side length of one tile in world units.
    #[serde(rename = "mapS")]
    pub map_s: u32,
    /// Colors keyed by tile id ("1") or category ("sky", "ground").
    #[serde(rename = "colorMap")]
    pub color_map: BTreeMap<String, [u8; 3]>,
    pub spawnpoint: (f32, f32),
}

impl MapDefinition {
    /// The original 8x8 demo arena.
    pub fn builtin() -> Self {
        #[rustfmt::skip]
        let grid = vec![
            1, 1, 1, 1, 1, 1, 1, 1,
            1, 1, 0, 1, 0, 0, 0, 1,
            1, 0, 0, 0, 0, 1, 0, 1,
            1, 1, 1, 0, 0, 0, 0, 1,
            1, 0, 0, 0, 0, 0, 0, 1,
            1, 0, 0, 0, 0, 0, 0, 1,
            1, 0, 0, 0, 0, 0, 0, 1,
            1, 0, 0, 0, 0, 0, 0, 1,
        ];
        let mut color_map = BTreeMap::new();
        color_map.insert("1".to_string(), [255, 0, 0]);
        color_map.insert("sky".to_string(), [0, 255, 255]);
        color_map.insert("ground".to_string(), [0, 0, 255]);

        Self {
            grid,
            map_x: 8,
            map_y: 8,
            map_s: 64,
            color_map,
            spawnpoint: (150.0, 400.0),
        }
    }

    /// Loads a map-editor JSON file.
    pub fn load(path: &Path) -> Result<Self, MapError> {
        let raw = std::fs::read_to_string(path)?;
        let map: MapDefinition = serde_json::from_str(&raw)?;
        map.validate()?;
        Ok(map)
    }

    pub fn validate(&self) -> Result<(), MapError> {
        if self.map_x == 0 || self.map_y == 0 || self.map_s == 0 {
            return Err(MapError::EmptyDimensions);
        }
        if self.grid.len() != self.map_x * self.map_y {
            return Err(MapError::GridSize {
                width: self.map_x,
                height: self.map_y,
                got: self.grid.len(),
            });
        }
        Ok(())
    }

    pub fn in_bounds(&self, mx: i32, my: i32) -> bool {
        mx >= 0 && (mx as usize) < self.map_x && my >= 0 && (my as usize) < self.map_y
    }

    /// Tile id at grid coordinates, None outside the map.
    pub fn tile_at(&self, mx: i32, my: i32) -> Option<u8> {
        if !self.in_bounds(mx, my) {
            return None;
        }
        Some(self.grid[my as usize * self.map_x + mx as usize])
    }

    /// Out of bounds counts as a wall.
    pub fn is_wall(&self, mx: i32, my: i32) -> bool {
        self.tile_at(mx, my).map_or(true, |tile| tile != 0)
    }

    /// Grid coordinates of the tile containing a world position.
    pub fn tile_index_at(&self, x: f32, y: f32) -> (i32, i32) {
        let side = self.map_s as i32;
        (
            (x.floor() as i32).div_euclid(side),
            (y.floor() as i32).div_euclid(side),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_map_is_valid() {
        let map = MapDefinition::builtin();
        assert!(map.validate().is_ok());
        assert_eq!(map.grid.len(), 64);
        assert_eq!(map.spawnpoint, (150.0, 400.0));
    }

    #[test]
    fn test_tile_lookup() {
        let map = MapDefinition::builtin();
        assert_eq!(map.tile_at(0, 0), Some(1));
        assert_eq!(map.tile_at(2, 6), Some(0));
        assert_eq!(map.tile_at(-1, 0), None);
        assert_eq!(map.tile_at(8, 0), None);
    }

    #[test]
    fn test_out_of_bounds_is_wall() {
        let map = MapDefinition::builtin();
        assert!(map.is_wall(-1, 3));
        assert!(map.is_wall(3, 8));
        assert!(map.is_wall(0, 0));
        assert!(!map.is_wall(2, 6));
    }

    #[test]
    fn test_tile_index_from_world_position() {
        let map = MapDefinition::builtin();
        assert_eq!(map.tile_index_at(150.0, 400.0), (2, 6));
        assert_eq!(map.tile_index_at(0.0, 0.0), (0, 0));
        assert_eq!(map.tile_index_at(63.9, 63.9), (0, 0));
        assert_eq!(map.tile_index_at(64.0, 64.0), (1, 1));
        assert_eq!(map.tile_index_at(-0.5, 10.0), (-1, 0));
    }

    #[test]
    fn test_validate_rejects_bad_grid() {
        let mut map = MapDefinition::builtin();
        map.grid.pop();
        assert!(matches!(map.validate(), Err(MapError::GridSize { .. })));

        let mut map = MapDefinition::builtin();
        map.map_x = 0;
        assert!(matches!(map.validate(), Err(MapError::EmptyDimensions)));
    }

    #[test]
    fn test_wire_field_names() {
        let map = MapDefinition::builtin();
        let value = serde_json::to_value(&map).unwrap();
        let obj = value.as_object().unwrap();
        for key in ["grid", "mapX", "mapY", "mapS", "colorMap", "spawnpoint"] {
            assert!(obj.contains_key(key), "missing wire key {key}");
        }
    }

    #[test]
    fn test_json_roundtrip() {
        let map = MapDefinition::builtin();
        let raw = serde_json::to_string(&map).unwrap();
        let back: MapDefinition = serde_json::from_str(&raw).unwrap();
        assert_eq!(map, back);
    }
}
