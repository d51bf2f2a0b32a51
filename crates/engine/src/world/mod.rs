mod collision;
mod geometry;
mod grid;
mod overworld;
mod scroll;
mod tilemap;

pub use collision::{
    BodyArena, BodyError, BodyKey, Collidable, CollisionError, CollisionRegistry, MovableBody,
    MovementOutcome, MovementReport, MovementRequest,
};
pub use geometry::{Aabb, Direction, GridPosition, Vec2};
pub use grid::{ChunkLoader, StreamError, TileMapGrid, TileVerdict, TileWalkabilityTable};
pub use overworld::{BoundaryEvent, FrameReport, Overworld, OverworldError};
pub use scroll::{
    InputGate, InputLatch, ScrollController, ScrollError, ScrollPhase, ScrollProgress, ScrollState,
};
pub use tilemap::{RawChunkData, TileId, TileMap, TileMapError};
