mod chunks;
mod tile_types;
mod world_content;

pub use chunks::{ChunkCatalog, ChunkContentError};
pub use tile_types::{SourceLocation, TileType, TileTypeError, TileTypeErrorCode, TileTypeTable};
pub use world_content::{load_world_content, ContentError, WorldContent};
