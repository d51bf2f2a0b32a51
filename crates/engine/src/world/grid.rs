use thiserror::Error;
use tracing::{debug, info};

use crate::config::ChunkLayout;

use super::geometry::{Aabb, Direction, GridPosition, Vec2};
use super::tilemap::{RawChunkData, TileId, TileMap, TileMapError};

/// Supplies raw chunk contents for a grid position. `None` means the chunk
/// was never authored or could not be read.
pub trait ChunkLoader {
    fn load(&mut self, position: GridPosition) -> Option<RawChunkData>;
}

pub trait TileWalkabilityTable {
    fn is_walkable(&self, tile: TileId) -> bool;
}

impl<F> TileWalkabilityTable for F
where
    F: Fn(TileId) -> bool,
{
    fn is_walkable(&self, tile: TileId) -> bool {
        self(tile)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StreamError {
    #[error("no grid cell {direction:?} of {from}")]
    OutOfGrid {
        from: GridPosition,
        direction: Direction,
    },
    #[error("grid position {position} is outside the grid")]
    OutOfRange { position: GridPosition },
    #[error("no chunk data authored for {position}")]
    NotAuthored { position: GridPosition },
    #[error("chunk data for {position} rejected: {source}")]
    Rejected {
        position: GridPosition,
        #[source]
        source: TileMapError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileVerdict {
    Walkable,
    Blocked,
    /// Inside the grid, but the owning chunk has not been streamed in yet.
    Unstreamed,
    OutsideGrid,
}

#[derive(Debug, Clone)]
pub struct TileMapGrid {
    layout: ChunkLayout,
    chunks: Vec<Option<TileMap>>,
}

impl TileMapGrid {
    pub fn new(layout: ChunkLayout) -> Self {
        let cells = layout.grid_width as usize * layout.grid_height as usize;
        Self {
            layout,
            chunks: vec![None; cells],
        }
    }

    pub fn layout(&self) -> &ChunkLayout {
        &self.layout
    }

    pub fn width(&self) -> u32 {
        self.layout.grid_width
    }

    pub fn height(&self) -> u32 {
        self.layout.grid_height
    }

    fn index_of(&self, position: GridPosition) -> Option<usize> {
        if !self.layout.contains_cell(position) {
            return None;
        }
        Some(position.row as usize * self.layout.grid_width as usize + position.column as usize)
    }

    pub fn chunk_at(&self, position: GridPosition) -> Option<&TileMap> {
        self.index_of(position)
            .and_then(|index| self.chunks.get(index))
            .and_then(Option::as_ref)
    }

    pub fn chunk_at_world(&self, world: Vec2) -> Option<&TileMap> {
        let position = self.layout.cell_at(world)?;
        self.chunk_at(position)
    }

    pub fn tile_at(&self, world: Vec2) -> Option<TileId> {
        self.chunk_at_world(world)?.tile_at_world(world)
    }

    pub fn walkable(&self, world: Vec2, table: &dyn TileWalkabilityTable) -> bool {
        self.tile_at(world)
            .map(|tile| table.is_walkable(tile))
            .unwrap_or(false)
    }

    pub fn tile_verdict(&self, world: Vec2, table: &dyn TileWalkabilityTable) -> TileVerdict {
        let Some(position) = self.layout.cell_at(world) else {
            return TileVerdict::OutsideGrid;
        };
        let Some(chunk) = self.chunk_at(position) else {
            return TileVerdict::Unstreamed;
        };
        match chunk.tile_at_world(world) {
            Some(tile) if table.is_walkable(tile) => TileVerdict::Walkable,
            _ => TileVerdict::Blocked,
        }
    }

    pub fn chunk_bounds(&self, position: GridPosition) -> Option<Aabb> {
        if !self.layout.contains_cell(position) {
            return None;
        }
        Some(Aabb::from_top_left(
            self.layout.top_left_of(position),
            self.layout.chunk_width_px(),
            self.layout.chunk_height_px(),
        ))
    }

    /// Obstacles of every populated chunk the rectangle touches. Obstacles
    /// never leave their own chunk, so this sees all of them.
    pub fn obstacles_overlapping<'a>(
        &'a self,
        rect: &'a Aabb,
    ) -> impl Iterator<Item = &'a Aabb> + 'a {
        self.layout
            .cells_overlapping(rect)
            .into_iter()
            .filter_map(move |position| self.chunk_at(position))
            .flat_map(|chunk| chunk.obstacles().iter())
            .filter(move |obstacle| obstacle.intersects(rect))
    }

    pub fn populated_count(&self) -> usize {
        self.chunks.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn insert(&mut self, chunk: TileMap) -> Result<Option<TileMap>, StreamError> {
        let position = chunk.grid_position();
        let index = self
            .index_of(position)
            .ok_or(StreamError::OutOfRange { position })?;
        Ok(self.chunks[index].replace(chunk))
    }

    pub fn remove(&mut self, position: GridPosition) -> Option<TileMap> {
        let index = self.index_of(position)?;
        self.chunks[index].take()
    }

    /// Makes sure the chunk at `position` is resident, building it from the
    /// loader when the slot is empty.
    pub fn stream_in(
        &mut self,
        position: GridPosition,
        loader: &mut dyn ChunkLoader,
    ) -> Result<&TileMap, StreamError> {
        let index = self
            .index_of(position)
            .ok_or(StreamError::OutOfRange { position })?;

        if self.chunks[index].is_none() {
            let raw = loader
                .load(position)
                .ok_or(StreamError::NotAuthored { position })?;
            let chunk = TileMap::build(position, &self.layout, raw)
                .map_err(|source| StreamError::Rejected { position, source })?;
            info!(
                row = position.row,
                column = position.column,
                obstacle_count = chunk.obstacles().len(),
                "chunk_streamed"
            );
            self.chunks[index] = Some(chunk);
        } else {
            debug!(row = position.row, column = position.column, "chunk_already_resident");
        }

        self.chunks[index]
            .as_ref()
            .ok_or(StreamError::NotAuthored { position })
    }
}
