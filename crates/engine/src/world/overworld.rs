use thiserror::Error;
use tracing::{debug, info};

use crate::config::OverworldConfig;

use super::collision::{
    BodyArena, BodyKey, Collidable, CollisionError, CollisionRegistry, MovableBody,
    MovementReport,
};
use super::geometry::{Aabb, Direction, GridPosition, Vec2};
use super::grid::{ChunkLoader, StreamError, TileMapGrid, TileVerdict, TileWalkabilityTable};
use super::scroll::{InputGate, ScrollController, ScrollError, ScrollProgress};
use super::tilemap::TileMap;

#[derive(Debug, Error)]
pub enum OverworldError {
    #[error("failed to stream starting chunk: {0}")]
    StartChunk(#[source] StreamError),
    #[error("failed to register player body: {0}")]
    Registration(#[from] CollisionError),
    #[error("player at ({x}, {y}) is outside starting chunk {chunk}")]
    PlayerOutsideStartChunk { x: f32, y: f32, chunk: GridPosition },
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoundaryEvent {
    None,
    ScrollStarted {
        direction: Direction,
        target: GridPosition,
    },
    Clamped {
        direction: Direction,
        reason: ScrollError,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub movement: MovementReport,
    pub boundary: BoundaryEvent,
    pub scroll: ScrollProgress,
    pub camera: Vec2,
    pub active_chunk: GridPosition,
}

/// Owns the world state for one overworld session and steps it a frame at a time:
/// movement resolution first, then the boundary check or scroll advance.
#[derive(Debug)]
pub struct Overworld {
    grid: TileMapGrid,
    active: GridPosition,
    scroll: ScrollController,
    registry: CollisionRegistry,
    bodies: BodyArena,
    player: BodyKey,
    scroll_nudge_px: f32,
}

impl Overworld {
    pub fn new(
        config: &OverworldConfig,
        start: GridPosition,
        player: MovableBody,
        loader: &mut dyn ChunkLoader,
    ) -> Result<Self, OverworldError> {
        let mut grid = TileMapGrid::new(config.layout());
        let start_bounds = grid
            .stream_in(start, loader)
            .map_err(OverworldError::StartChunk)?
            .bounds();
        let center = player.position();
        if !start_bounds.contains(center) {
            return Err(OverworldError::PlayerOutsideStartChunk {
                x: center.x,
                y: center.y,
                chunk: start,
            });
        }

        let mut bodies = BodyArena::default();
        let mut registry = CollisionRegistry::new();
        let player = bodies.insert(player);
        registry.register(&bodies, player)?;

        info!(
            start = %start,
            player_x = center.x,
            player_y = center.y,
            "overworld_ready"
        );
        Ok(Self {
            grid,
            active: start,
            scroll: ScrollController::new(start_bounds.min, config.scroll_duration_seconds),
            registry,
            bodies,
            player,
            scroll_nudge_px: config.scroll_nudge_px,
        })
    }

    pub fn grid(&self) -> &TileMapGrid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut TileMapGrid {
        &mut self.grid
    }

    pub fn active_position(&self) -> GridPosition {
        self.active
    }

    pub fn active_chunk(&self) -> Option<&TileMap> {
        self.grid.chunk_at(self.active)
    }

    pub fn scroll(&self) -> &ScrollController {
        &self.scroll
    }

    pub fn camera_position(&self) -> Vec2 {
        self.scroll.camera_position()
    }

    pub fn registry(&self) -> &CollisionRegistry {
        &self.registry
    }

    pub fn player_key(&self) -> BodyKey {
        self.player
    }

    pub fn player(&self) -> Option<&MovableBody> {
        self.bodies.get(self.player)
    }

    pub fn body(&self, key: BodyKey) -> Option<&MovableBody> {
        self.bodies.get(key)
    }

    pub fn body_mut(&mut self, key: BodyKey) -> Option<&mut MovableBody> {
        self.bodies.get_mut(key)
    }

    pub fn spawn_body(&mut self, body: MovableBody) -> Result<BodyKey, CollisionError> {
        let key = self.bodies.insert(body);
        if let Err(error) = self.registry.register(&self.bodies, key) {
            self.bodies.remove(key);
            return Err(error);
        }
        Ok(key)
    }

    pub fn despawn_body(&mut self, key: BodyKey) -> Option<MovableBody> {
        self.bodies.remove(key)
    }

    /// Queues player movement for the next frame. Refused while a scroll runs.
    pub fn request_player_move(&mut self, direction: Direction, distance_px: f32) -> bool {
        if self.scroll.is_scrolling() {
            return false;
        }
        match self.bodies.get_mut(self.player) {
            Some(player) => {
                player.request_move(direction, distance_px);
                true
            }
            None => false,
        }
    }

    pub fn update(
        &mut self,
        dt_seconds: f32,
        loader: &mut dyn ChunkLoader,
        table: &dyn TileWalkabilityTable,
        gate: &mut dyn InputGate,
    ) -> FrameReport {
        let movement = self.registry.simulate_movement_with_crosser(
            &mut self.bodies,
            &self.grid,
            table,
            self.player,
        );

        let (boundary, scroll) = if self.scroll.is_scrolling() {
            let progress = self.scroll.advance(dt_seconds, gate);
            if let ScrollProgress::Finished { target } = progress {
                self.active = target;
            }
            (BoundaryEvent::None, progress)
        } else {
            let boundary = self.check_boundary(loader, table, gate);
            let scroll = if matches!(boundary, BoundaryEvent::ScrollStarted { .. }) {
                ScrollProgress::Scrolling { fraction: 0.0 }
            } else {
                ScrollProgress::Idle
            };
            (boundary, scroll)
        };

        FrameReport {
            movement,
            boundary,
            scroll,
            camera: self.scroll.camera_position(),
            active_chunk: self.active,
        }
    }

    fn check_boundary(
        &mut self,
        loader: &mut dyn ChunkLoader,
        table: &dyn TileWalkabilityTable,
        gate: &mut dyn InputGate,
    ) -> BoundaryEvent {
        let Some(bounds) = self.grid.chunk_bounds(self.active) else {
            return BoundaryEvent::None;
        };
        let Some(player) = self.bodies.get(self.player) else {
            return BoundaryEvent::None;
        };
        let center = player.position();
        let half_extents = player.half_extents();
        let Some(direction) = crossed_edge(&bounds, center) else {
            return BoundaryEvent::None;
        };

        match self.scroll.begin_scroll(
            direction,
            self.active,
            &mut self.grid,
            loader,
            gate,
        ) {
            Ok(target) => {
                let nudged = center.offset(direction, self.scroll_nudge_px);
                if self.is_clear(nudged, half_extents, table) {
                    debug!(
                        direction = ?direction,
                        x = nudged.x,
                        y = nudged.y,
                        "player_nudged_into_new_chunk"
                    );
                    self.apply_player_position(nudged);
                } else {
                    debug!(
                        direction = ?direction,
                        x = center.x,
                        y = center.y,
                        "player_nudge_skipped"
                    );
                }
                BoundaryEvent::ScrollStarted { direction, target }
            }
            Err(reason) => {
                let clamped = clamp_inside(&bounds, center, half_extents, direction);
                info!(
                    direction = ?direction,
                    active = %self.active,
                    reason = %reason,
                    x = clamped.x,
                    y = clamped.y,
                    "scroll_refused_player_clamped"
                );
                self.apply_player_position(clamped);
                BoundaryEvent::Clamped { direction, reason }
            }
        }
    }

    fn is_clear(
        &self,
        center: Vec2,
        half_extents: Vec2,
        table: &dyn TileWalkabilityTable,
    ) -> bool {
        let rect = Aabb::from_center(center, half_extents);
        self.grid.obstacles_overlapping(&rect).next().is_none()
            && self.grid.tile_verdict(center, table) == TileVerdict::Walkable
    }

    fn apply_player_position(&mut self, center: Vec2) {
        if let Some(player) = self.bodies.get_mut(self.player) {
            player.apply_position(center);
        }
    }
}

/// Edge of the half-open chunk rectangle the point has moved past, if any.
/// Vertical edges are checked first.
fn crossed_edge(bounds: &Aabb, center: Vec2) -> Option<Direction> {
    if center.y < bounds.min.y {
        Some(Direction::Up)
    } else if center.y >= bounds.max.y {
        Some(Direction::Down)
    } else if center.x < bounds.min.x {
        Some(Direction::Left)
    } else if center.x >= bounds.max.x {
        Some(Direction::Right)
    } else {
        None
    }
}

fn clamp_inside(bounds: &Aabb, center: Vec2, half_extents: Vec2, direction: Direction) -> Vec2 {
    match direction {
        Direction::Up => Vec2::new(center.x, bounds.min.y + half_extents.y),
        Direction::Down => Vec2::new(center.x, bounds.max.y - half_extents.y),
        Direction::Left => Vec2::new(bounds.min.x + half_extents.x, center.y),
        Direction::Right => Vec2::new(bounds.max.x - half_extents.x, center.y),
    }
}
