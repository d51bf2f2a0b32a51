use thiserror::Error;
use tracing::info;

use crate::config::{ConfigError, OverworldConfig};
use crate::AppPaths;

use super::chunks::{ChunkCatalog, ChunkContentError};
use super::tile_types::{TileTypeError, TileTypeTable};

#[derive(Debug, Error)]
pub enum ContentError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Chunks(#[from] ChunkContentError),
    #[error(transparent)]
    TileTypes(#[from] TileTypeError),
}

/// Everything read from disk before the overworld starts.
#[derive(Debug, Clone)]
pub struct WorldContent {
    pub config: OverworldConfig,
    pub chunks: ChunkCatalog,
    pub tile_types: TileTypeTable,
}

pub fn load_world_content(paths: &AppPaths) -> Result<WorldContent, ContentError> {
    let config = OverworldConfig::load_or_default(&paths.config_path)?;
    let chunks = ChunkCatalog::load_dir(&paths.chunks_dir, &config.layout())?;
    let tile_types = TileTypeTable::load(&paths.tile_types_path)?;
    info!(
        chunk_count = chunks.len(),
        tile_type_count = tile_types.len(),
        "world_content_loaded"
    );
    Ok(WorldContent {
        config,
        chunks,
        tile_types,
    })
}
