use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::world::{Aabb, GridPosition, Vec2};

pub const CONFIG_FILE_NAME: &str = "overworld.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OverworldConfig {
    pub grid_width: u32,
    pub grid_height: u32,
    pub chunk_width_tiles: u32,
    pub chunk_height_tiles: u32,
    pub tile_size_px: f32,
    pub world_origin: Vec2,
    pub scroll_duration_seconds: f32,
    pub scroll_nudge_px: f32,
}

impl Default for OverworldConfig {
    fn default() -> Self {
        Self {
            grid_width: 7,
            grid_height: 7,
            chunk_width_tiles: 16,
            chunk_height_tiles: 12,
            tile_size_px: 16.0,
            world_origin: Vec2::ZERO,
            scroll_duration_seconds: 2.0,
            scroll_nudge_px: 4.0,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path} at {json_path}: {source}")]
    Parse {
        path: PathBuf,
        json_path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config field {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

impl OverworldConfig {
    /// Reads `path` if it exists, otherwise falls back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!(path = %path.display(), "config_missing_using_defaults");
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(path, &raw)?;
        info!(
            path = %path.display(),
            grid_width = config.grid_width,
            grid_height = config.grid_height,
            chunk_width_tiles = config.chunk_width_tiles,
            chunk_height_tiles = config.chunk_height_tiles,
            tile_size_px = config.tile_size_px,
            "config_loaded"
        );
        Ok(config)
    }

    pub fn from_json_str(path: &Path, raw: &str) -> Result<Self, ConfigError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let config: OverworldConfig = serde_path_to_error::deserialize(&mut deserializer)
            .map_err(|error| {
                let json_path = error.path().to_string();
                ConfigError::Parse {
                    path: path.to_path_buf(),
                    json_path,
                    source: error.into_inner(),
                }
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid_width == 0 || self.grid_height == 0 {
            return Err(invalid("grid_width", "grid dimensions must be non-zero"));
        }
        if self.chunk_width_tiles == 0 || self.chunk_height_tiles == 0 {
            return Err(invalid(
                "chunk_width_tiles",
                "chunk dimensions must be non-zero",
            ));
        }
        if !self.tile_size_px.is_finite() || self.tile_size_px <= 0.0 {
            return Err(invalid(
                "tile_size_px",
                format!("expected a positive size, got {}", self.tile_size_px),
            ));
        }
        if !self.world_origin.is_finite() {
            return Err(invalid("world_origin", "origin must be finite"));
        }
        if !self.scroll_duration_seconds.is_finite() || self.scroll_duration_seconds <= 0.0 {
            return Err(invalid(
                "scroll_duration_seconds",
                format!(
                    "expected a positive duration, got {}",
                    self.scroll_duration_seconds
                ),
            ));
        }
        if !self.scroll_nudge_px.is_finite() || self.scroll_nudge_px < 0.0 {
            return Err(invalid(
                "scroll_nudge_px",
                format!("expected a non-negative nudge, got {}", self.scroll_nudge_px),
            ));
        }
        Ok(())
    }

    pub fn layout(&self) -> ChunkLayout {
        ChunkLayout {
            grid_width: self.grid_width,
            grid_height: self.grid_height,
            chunk_width_tiles: self.chunk_width_tiles,
            chunk_height_tiles: self.chunk_height_tiles,
            tile_size_px: self.tile_size_px,
            origin: self.world_origin,
        }
    }
}

fn invalid(field: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        message: message.into(),
    }
}

/// Fixed geometry shared by every chunk in the grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkLayout {
    pub grid_width: u32,
    pub grid_height: u32,
    pub chunk_width_tiles: u32,
    pub chunk_height_tiles: u32,
    pub tile_size_px: f32,
    pub origin: Vec2,
}

impl ChunkLayout {
    pub fn chunk_width_px(&self) -> f32 {
        self.chunk_width_tiles as f32 * self.tile_size_px
    }

    pub fn chunk_height_px(&self) -> f32 {
        self.chunk_height_tiles as f32 * self.tile_size_px
    }

    pub fn tiles_per_chunk(&self) -> usize {
        self.chunk_width_tiles as usize * self.chunk_height_tiles as usize
    }

    pub fn top_left_of(&self, position: GridPosition) -> Vec2 {
        Vec2 {
            x: self.origin.x + position.column as f32 * self.chunk_width_px(),
            y: self.origin.y + position.row as f32 * self.chunk_height_px(),
        }
    }

    /// Grid cell under a world point, or `None` outside the grid.
    pub fn cell_at(&self, world: Vec2) -> Option<GridPosition> {
        if !world.is_finite() {
            return None;
        }
        let column = ((world.x - self.origin.x) / self.chunk_width_px()).floor();
        let row = ((world.y - self.origin.y) / self.chunk_height_px()).floor();
        if column < 0.0 || row < 0.0 {
            return None;
        }
        if column >= self.grid_width as f32 || row >= self.grid_height as f32 {
            return None;
        }
        Some(GridPosition::new(row as u32, column as u32))
    }

    /// Every in-grid cell the rectangle touches, row by row.
    pub fn cells_overlapping(&self, rect: &Aabb) -> Vec<GridPosition> {
        if !rect.min.is_finite() || !rect.max.is_finite() {
            return Vec::new();
        }
        let columns = cell_span(
            rect.min.x - self.origin.x,
            rect.max.x - self.origin.x,
            self.chunk_width_px(),
            self.grid_width,
        );
        let rows = cell_span(
            rect.min.y - self.origin.y,
            rect.max.y - self.origin.y,
            self.chunk_height_px(),
            self.grid_height,
        );
        let (Some((first_column, last_column)), Some((first_row, last_row))) = (columns, rows)
        else {
            return Vec::new();
        };
        (first_row..=last_row)
            .flat_map(|row| {
                (first_column..=last_column).map(move |column| GridPosition::new(row, column))
            })
            .collect()
    }

    pub fn contains_cell(&self, position: GridPosition) -> bool {
        position.row < self.grid_height && position.column < self.grid_width
    }
}

fn cell_span(min: f32, max: f32, cell_size: f32, count: u32) -> Option<(u32, u32)> {
    let first = (min / cell_size).floor().max(0.0);
    let last = (max / cell_size).floor().min(count as f32 - 1.0);
    (first <= last).then_some((first as u32, last as u32))
}

impl Default for ChunkLayout {
    fn default() -> Self {
        OverworldConfig::default().layout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid_and_matches_chunk_size() {
        let config = OverworldConfig::default();
        config.validate().expect("valid");
        let layout = config.layout();
        assert_eq!(layout.chunk_width_px(), 256.0);
        assert_eq!(layout.chunk_height_px(), 192.0);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = OverworldConfig::from_json_str(
            Path::new("overworld.json"),
            r#"{ "scroll_duration_seconds": 3.0 }"#,
        )
        .expect("parse");
        assert_eq!(config.scroll_duration_seconds, 3.0);
        assert_eq!(config.grid_width, 7);
    }

    #[test]
    fn parse_error_names_json_path() {
        let error = OverworldConfig::from_json_str(
            Path::new("overworld.json"),
            r#"{ "world_origin": { "x": "left", "y": 0.0 } }"#,
        )
        .expect_err("bad origin");
        match error {
            ConfigError::Parse { json_path, .. } => assert_eq!(json_path, "world_origin.x"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn zero_duration_is_rejected() {
        let config = OverworldConfig {
            scroll_duration_seconds: 0.0,
            ..OverworldConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "scroll_duration_seconds",
                ..
            })
        ));
    }

    #[test]
    fn cell_at_handles_origin_offset_and_bounds() {
        let layout = ChunkLayout {
            origin: Vec2::new(-256.0, 0.0),
            ..ChunkLayout::default()
        };
        assert_eq!(
            layout.cell_at(Vec2::new(-1.0, 10.0)),
            Some(GridPosition::new(0, 0))
        );
        assert_eq!(
            layout.cell_at(Vec2::new(0.0, 10.0)),
            Some(GridPosition::new(0, 1))
        );
        assert_eq!(layout.cell_at(Vec2::new(-257.0, 10.0)), None);
        assert_eq!(layout.cell_at(Vec2::new(f32::NAN, 10.0)), None);
        assert_eq!(layout.cell_at(Vec2::new(1.0e9, 10.0)), None);
    }

    #[test]
    fn cells_overlapping_covers_every_spanned_chunk() {
        let layout = ChunkLayout::default();
        let wide = Aabb::new(Vec2::new(200.0, 100.0), Vec2::new(600.0, 200.0));
        assert_eq!(
            layout.cells_overlapping(&wide),
            vec![
                GridPosition::new(0, 0),
                GridPosition::new(0, 1),
                GridPosition::new(0, 2),
                GridPosition::new(1, 0),
                GridPosition::new(1, 1),
                GridPosition::new(1, 2),
            ]
        );

        let hanging_off = Aabb::new(Vec2::new(-50.0, -50.0), Vec2::new(10.0, 10.0));
        assert_eq!(
            layout.cells_overlapping(&hanging_off),
            vec![GridPosition::new(0, 0)]
        );
        let outside = Aabb::new(Vec2::new(-50.0, -50.0), Vec2::new(-10.0, -10.0));
        assert!(layout.cells_overlapping(&outside).is_empty());
    }

    #[test]
    fn missing_file_uses_defaults() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let config =
            OverworldConfig::load_or_default(&temp.path().join(CONFIG_FILE_NAME)).expect("load");
        assert_eq!(config, OverworldConfig::default());
    }
}
