use thiserror::Error;

use crate::config::ChunkLayout;

use super::geometry::{Aabb, GridPosition, Vec2};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId(pub u16);

/// Chunk contents as supplied by a loader, before placement in the world.
/// Obstacles are in chunk-local pixels and must lie within the chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct RawChunkData {
    pub width: u32,
    pub height: u32,
    pub tiles: Vec<TileId>,
    pub obstacles: Vec<Aabb>,
}

impl RawChunkData {
    pub fn filled(width: u32, height: u32, tile: TileId) -> Self {
        Self {
            width,
            height,
            tiles: vec![tile; width as usize * height as usize],
            obstacles: Vec::new(),
        }
    }

    pub fn with_obstacle(mut self, obstacle: Aabb) -> Self {
        self.obstacles.push(obstacle);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum TileMapError {
    #[error("tile count mismatch: expected {expected}, got {actual}")]
    TileCountMismatch { expected: usize, actual: usize },
    #[error("chunk is {width}x{height} tiles, layout requires {expected_width}x{expected_height}")]
    DimensionMismatch {
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },
    #[error("obstacle {index} has non-positive or non-finite size")]
    InvalidObstacle { index: usize },
    #[error("obstacle {index} extends past the chunk edge")]
    ObstacleOutsideChunk { index: usize },
}

/// `top_left` is fixed at construction from `grid_position` and the shared
/// [`ChunkLayout`]. Tiles are row-major from `top_left`.
#[derive(Debug, Clone, PartialEq)]
pub struct TileMap {
    grid_position: GridPosition,
    top_left: Vec2,
    width: u32,
    height: u32,
    tile_size_px: f32,
    tiles: Vec<TileId>,
    obstacles: Vec<Aabb>,
}

impl TileMap {
    pub fn build(
        grid_position: GridPosition,
        layout: &ChunkLayout,
        raw: RawChunkData,
    ) -> Result<Self, TileMapError> {
        if raw.width != layout.chunk_width_tiles || raw.height != layout.chunk_height_tiles {
            return Err(TileMapError::DimensionMismatch {
                width: raw.width,
                height: raw.height,
                expected_width: layout.chunk_width_tiles,
                expected_height: layout.chunk_height_tiles,
            });
        }
        let expected = raw.width as usize * raw.height as usize;
        let actual = raw.tiles.len();
        if expected != actual {
            return Err(TileMapError::TileCountMismatch { expected, actual });
        }

        let top_left = layout.top_left_of(grid_position);
        let mut obstacles = Vec::with_capacity(raw.obstacles.len());
        for (index, local) in raw.obstacles.into_iter().enumerate() {
            let valid = local.min.is_finite()
                && local.max.is_finite()
                && local.width() > 0.0
                && local.height() > 0.0;
            if !valid {
                return Err(TileMapError::InvalidObstacle { index });
            }
            let inside = local.min.x >= 0.0
                && local.min.y >= 0.0
                && local.max.x <= layout.chunk_width_px()
                && local.max.y <= layout.chunk_height_px();
            if !inside {
                return Err(TileMapError::ObstacleOutsideChunk { index });
            }
            obstacles.push(local.translated(top_left));
        }

        Ok(Self {
            grid_position,
            top_left,
            width: raw.width,
            height: raw.height,
            tile_size_px: layout.tile_size_px,
            tiles: raw.tiles,
            obstacles,
        })
    }

    pub fn grid_position(&self) -> GridPosition {
        self.grid_position
    }

    pub fn top_left(&self) -> Vec2 {
        self.top_left
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::from_top_left(
            self.top_left,
            self.width as f32 * self.tile_size_px,
            self.height as f32 * self.tile_size_px,
        )
    }

    pub fn obstacles(&self) -> &[Aabb] {
        &self.obstacles
    }

    pub fn index_of(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    pub fn tile_at(&self, x: u32, y: u32) -> Option<TileId> {
        self.index_of(x, y)
            .and_then(|index| self.tiles.get(index).copied())
    }

    pub fn tile_at_world(&self, world: Vec2) -> Option<TileId> {
        if !self.bounds().contains(world) {
            return None;
        }
        let x = ((world.x - self.top_left.x) / self.tile_size_px).floor() as u32;
        let y = ((world.y - self.top_left.y) / self.tile_size_px).floor() as u32;
        self.tile_at(x, y)
    }
}
