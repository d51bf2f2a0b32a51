use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ChunkLayout;
use crate::world::{
    Aabb, ChunkLoader, GridPosition, RawChunkData, TileId, TileMap, TileMapError, Vec2,
};

#[derive(Debug, Error)]
pub enum ChunkContentError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse chunk {path} at {json_path}: {source}")]
    Parse {
        path: PathBuf,
        json_path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("chunk {path} is placed at {position}, outside the grid")]
    OutsideGrid { path: PathBuf, position: GridPosition },
    #[error("chunk {path} is invalid: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: TileMapError,
    },
    #[error("chunk {path} redefines {position}, already defined by {first}")]
    Duplicate {
        path: PathBuf,
        position: GridPosition,
        first: PathBuf,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ChunkDocument {
    row: u32,
    column: u32,
    width: u32,
    height: u32,
    tiles: Vec<u16>,
    #[serde(default)]
    obstacles: Vec<ObstacleDocument>,
}

/// Obstacle rectangle in chunk-local pixels.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ObstacleDocument {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    // Authoring label only; collision treats every obstacle alike.
    #[serde(default, rename = "kind")]
    _kind: Option<String>,
}

impl ChunkDocument {
    fn into_raw(self) -> (GridPosition, RawChunkData) {
        let obstacles = self
            .obstacles
            .into_iter()
            .map(|obstacle| {
                Aabb::from_top_left(
                    Vec2::new(obstacle.x, obstacle.y),
                    obstacle.width,
                    obstacle.height,
                )
            })
            .collect();
        (
            GridPosition::new(self.row, self.column),
            RawChunkData {
                width: self.width,
                height: self.height,
                tiles: self.tiles.into_iter().map(TileId).collect(),
                obstacles,
            },
        )
    }
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    source: PathBuf,
    raw: RawChunkData,
}

/// Every authored chunk, read and validated up front. Serves as the
/// [`ChunkLoader`] for the running overworld.
#[derive(Debug, Clone, Default)]
pub struct ChunkCatalog {
    entries: BTreeMap<GridPosition, CatalogEntry>,
}

impl ChunkCatalog {
    pub fn load_dir(dir: &Path, layout: &ChunkLayout) -> Result<Self, ChunkContentError> {
        let files = collect_json_files_sorted(dir)?;
        let mut catalog = Self::default();
        for path in files {
            let raw = fs::read_to_string(&path).map_err(|source| ChunkContentError::Io {
                path: path.clone(),
                source,
            })?;
            let (position, chunk) = parse_chunk_document(&path, &raw)?;
            catalog.insert_validated(path, position, chunk, layout)?;
        }
        info!(
            dir = %dir.display(),
            chunk_count = catalog.len(),
            "chunk_catalog_loaded"
        );
        Ok(catalog)
    }

    fn insert_validated(
        &mut self,
        source: PathBuf,
        position: GridPosition,
        raw: RawChunkData,
        layout: &ChunkLayout,
    ) -> Result<(), ChunkContentError> {
        if !layout.contains_cell(position) {
            return Err(ChunkContentError::OutsideGrid {
                path: source,
                position,
            });
        }
        if let Some(existing) = self.entries.get(&position) {
            return Err(ChunkContentError::Duplicate {
                path: source,
                position,
                first: existing.source.clone(),
            });
        }
        if let Err(error) = TileMap::build(position, layout, raw.clone()) {
            return Err(ChunkContentError::Invalid {
                path: source,
                source: error,
            });
        }
        self.entries.insert(position, CatalogEntry { source, raw });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, position: GridPosition) -> bool {
        self.entries.contains_key(&position)
    }

    pub fn positions(&self) -> impl Iterator<Item = GridPosition> + '_ {
        self.entries.keys().copied()
    }
}

impl ChunkLoader for ChunkCatalog {
    fn load(&mut self, position: GridPosition) -> Option<RawChunkData> {
        let entry = self.entries.get(&position);
        if entry.is_none() {
            debug!(row = position.row, column = position.column, "chunk_not_authored");
        }
        entry.map(|entry| entry.raw.clone())
    }
}

fn parse_chunk_document(
    path: &Path,
    raw: &str,
) -> Result<(GridPosition, RawChunkData), ChunkContentError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    let document: ChunkDocument =
        serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
            let json_path = error.path().to_string();
            ChunkContentError::Parse {
                path: path.to_path_buf(),
                json_path,
                source: error.into_inner(),
            }
        })?;
    Ok(document.into_raw())
}

fn collect_json_files_sorted(dir: &Path) -> Result<Vec<PathBuf>, ChunkContentError> {
    let entries = fs::read_dir(dir).map_err(|source| ChunkContentError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files = Vec::<PathBuf>::new();
    for entry in entries {
        let entry = entry.map_err(|source| ChunkContentError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_file()
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
