use slotmap::{new_key_type, SlotMap};
use thiserror::Error;
use tracing::{debug, trace};

use super::geometry::{Aabb, Direction, Vec2};
use super::grid::{TileMapGrid, TileVerdict, TileWalkabilityTable};

new_key_type! {
    /// Generational handle to a body. A key whose body was removed from the
    /// arena no longer resolves, even if the slot is reused.
    pub struct BodyKey;
}

/// Storage for bodies. Whoever owns the arena owns the bodies; the
/// [`CollisionRegistry`] only keeps keys into it.
pub type BodyArena<B = MovableBody> = SlotMap<BodyKey, B>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementRequest {
    pub direction: Direction,
    pub distance_px: f32,
}

pub trait Collidable {
    fn position(&self) -> Vec2;
    fn bounding_box(&self) -> Aabb;
    fn request_movement(&mut self, request: MovementRequest);
    /// Takes the pending request, leaving none behind.
    fn claim_pending_movement(&mut self) -> Option<MovementRequest>;
    fn apply_position(&mut self, center: Vec2);
    fn can_fly(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum BodyError {
    #[error("half extents must be positive and finite, got ({width}, {height})")]
    InvalidGeometry { width: f32, height: f32 },
    #[error("center must be finite, got ({x}, {y})")]
    InvalidPosition { x: f32, y: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CollisionError {
    #[error(transparent)]
    Body(#[from] BodyError),
    #[error("body key does not refer to a live body")]
    StaleBody,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MovableBody {
    center: Vec2,
    half_extents: Vec2,
    pending: Option<MovementRequest>,
    flying: bool,
}

impl MovableBody {
    pub fn new(center: Vec2, half_extents: Vec2) -> Result<Self, BodyError> {
        validate_half_extents(half_extents)?;
        if !center.is_finite() {
            return Err(BodyError::InvalidPosition {
                x: center.x,
                y: center.y,
            });
        }
        Ok(Self {
            center,
            half_extents,
            pending: None,
            flying: false,
        })
    }

    pub fn flying(mut self) -> Self {
        self.flying = true;
        self
    }

    pub fn half_extents(&self) -> Vec2 {
        self.half_extents
    }

    pub fn pending_movement(&self) -> Option<MovementRequest> {
        self.pending
    }

    /// Replaces any request not yet claimed.
    pub fn request_move(&mut self, direction: Direction, distance_px: f32) {
        self.pending = Some(MovementRequest {
            direction,
            distance_px,
        });
    }
}

impl Collidable for MovableBody {
    fn position(&self) -> Vec2 {
        self.center
    }

    fn bounding_box(&self) -> Aabb {
        Aabb::from_center(self.center, self.half_extents)
    }

    fn request_movement(&mut self, request: MovementRequest) {
        self.pending = Some(request);
    }

    fn claim_pending_movement(&mut self) -> Option<MovementRequest> {
        self.pending.take()
    }

    fn apply_position(&mut self, center: Vec2) {
        self.center = center;
    }

    fn can_fly(&self) -> bool {
        self.flying
    }
}

fn validate_half_extents(half_extents: Vec2) -> Result<(), BodyError> {
    let valid = half_extents.is_finite() && half_extents.x > 0.0 && half_extents.y > 0.0;
    if !valid {
        return Err(BodyError::InvalidGeometry {
            width: half_extents.x,
            height: half_extents.y,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MovementOutcome {
    Moved { from: Vec2, to: Vec2 },
    BlockedByObstacle { obstacle: Aabb },
    BlockedByTile { verdict: TileVerdict },
    Ignored,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovementReport {
    pub outcomes: Vec<(BodyKey, MovementOutcome)>,
    pub pruned: usize,
}

impl MovementReport {
    pub fn outcome_for(&self, key: BodyKey) -> Option<MovementOutcome> {
        self.outcomes
            .iter()
            .find(|(candidate, _)| *candidate == key)
            .map(|(_, outcome)| *outcome)
    }

    pub fn moved_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, MovementOutcome::Moved { .. }))
            .count()
    }
}

/// Keys are visited in registration order.
#[derive(Debug, Default, Clone)]
pub struct CollisionRegistry {
    entries: Vec<BodyKey>,
}

impl CollisionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<B: Collidable>(
        &mut self,
        bodies: &BodyArena<B>,
        key: BodyKey,
    ) -> Result<BodyKey, CollisionError> {
        let body = bodies.get(key).ok_or(CollisionError::StaleBody)?;
        let bounds = body.bounding_box();
        validate_half_extents(Vec2::new(bounds.width() * 0.5, bounds.height() * 0.5))?;
        if !self.entries.contains(&key) {
            self.entries.push(key);
        }
        Ok(key)
    }

    pub fn unregister(&mut self, key: BodyKey) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| *entry != key);
        before != self.entries.len()
    }

    pub fn contains(&self, key: BodyKey) -> bool {
        self.entries.contains(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves every pending request. Destinations in cells that are inside
    /// the grid but not streamed in are rejected.
    pub fn simulate_movement<B: Collidable>(
        &mut self,
        bodies: &mut BodyArena<B>,
        grid: &TileMapGrid,
        table: &dyn TileWalkabilityTable,
    ) -> MovementReport {
        self.simulate(bodies, grid, table, None)
    }

    /// Like [`simulate_movement`](Self::simulate_movement), except `crosser` may
    /// step into an unstreamed cell so the caller's boundary check can scroll or
    /// clamp it.
    pub fn simulate_movement_with_crosser<B: Collidable>(
        &mut self,
        bodies: &mut BodyArena<B>,
        grid: &TileMapGrid,
        table: &dyn TileWalkabilityTable,
        crosser: BodyKey,
    ) -> MovementReport {
        self.simulate(bodies, grid, table, Some(crosser))
    }

    fn simulate<B: Collidable>(
        &mut self,
        bodies: &mut BodyArena<B>,
        grid: &TileMapGrid,
        table: &dyn TileWalkabilityTable,
        crosser: Option<BodyKey>,
    ) -> MovementReport {
        let mut report = MovementReport::default();

        for key in self.entries.iter().copied() {
            let Some(body) = bodies.get_mut(key) else {
                continue;
            };
            let Some(request) = body.claim_pending_movement() else {
                continue;
            };
            let may_enter_unstreamed = crosser == Some(key);
            let outcome = resolve_movement(body, request, grid, table, may_enter_unstreamed);
            match outcome {
                MovementOutcome::Moved { to, .. } => body.apply_position(to),
                MovementOutcome::Ignored => {
                    debug!(?key, distance_px = request.distance_px, "movement_ignored")
                }
                blocked => trace!(?key, outcome = ?blocked, "movement_blocked"),
            }
            report.outcomes.push((key, outcome));
        }

        let before = self.entries.len();
        self.entries.retain(|key| bodies.contains_key(*key));
        report.pruned = before - self.entries.len();
        if report.pruned > 0 {
            debug!(
                pruned = report.pruned,
                remaining = self.entries.len(),
                "collision_registry_pruned"
            );
        }
        report
    }
}

fn resolve_movement<B: Collidable>(
    body: &B,
    request: MovementRequest,
    grid: &TileMapGrid,
    table: &dyn TileWalkabilityTable,
    may_enter_unstreamed: bool,
) -> MovementOutcome {
    if !request.distance_px.is_finite() || request.distance_px < 0.0 {
        return MovementOutcome::Ignored;
    }

    let from = body.position();
    let to = from.offset(request.direction, request.distance_px);
    if body.can_fly() {
        return MovementOutcome::Moved { from, to };
    }

    let (dx, dy) = request.direction.unit();
    let delta = Vec2::new(dx * request.distance_px, dy * request.distance_px);
    let candidate = body.bounding_box().translated(delta);
    if let Some(obstacle) = grid.obstacles_overlapping(&candidate).next() {
        return MovementOutcome::BlockedByObstacle {
            obstacle: *obstacle,
        };
    }

    match grid.tile_verdict(to, table) {
        TileVerdict::Walkable => MovementOutcome::Moved { from, to },
        TileVerdict::Unstreamed if may_enter_unstreamed => MovementOutcome::Moved { from, to },
        verdict => MovementOutcome::BlockedByTile { verdict },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkLayout;
    use crate::world::geometry::GridPosition;
    use crate::world::tilemap::{RawChunkData, TileId, TileMap};

    const GRASS: TileId = TileId(0);
    const WATER: TileId = TileId(2);

    fn not_water(tile: TileId) -> bool {
        tile != WATER
    }

    fn grid_with(chunks: Vec<(GridPosition, RawChunkData)>) -> TileMapGrid {
        let layout = ChunkLayout::default();
        let mut grid = TileMapGrid::new(layout);
        for (position, raw) in chunks {
            grid.insert(TileMap::build(position, &layout, raw).expect("build"))
                .expect("insert");
        }
        grid
    }

    fn open_field() -> TileMapGrid {
        grid_with(vec![(
            GridPosition::new(0, 1),
            RawChunkData::filled(16, 12, GRASS),
        )])
    }

    fn player(arena: &mut BodyArena, registry: &mut CollisionRegistry, at: Vec2) -> BodyKey {
        let body = MovableBody::new(at, Vec2::new(8.0, 8.0)).expect("body");
        let key = arena.insert(body);
        registry.register(arena, key).expect("register")
    }

    #[test]
    fn move_up_on_open_ground_commits_new_position() {
        let grid = open_field();
        let mut arena: BodyArena = BodyArena::default();
        let mut registry = CollisionRegistry::new();
        let key = player(&mut arena, &mut registry, Vec2::new(300.0, 100.0));

        arena[key].request_move(Direction::Up, 16.0);
        let report = registry.simulate_movement(&mut arena, &grid, &not_water);

        assert_eq!(arena[key].position(), Vec2::new(300.0, 84.0));
        assert_eq!(report.moved_count(), 1);
    }

    #[test]
    fn obstacle_in_destination_rejects_whole_move() {
        let tree = Aabb::new(Vec2::new(36.0, 70.0), Vec2::new(52.0, 90.0));
        let grid = grid_with(vec![(
            GridPosition::new(0, 1),
            RawChunkData::filled(16, 12, GRASS).with_obstacle(tree),
        )]);
        let mut arena: BodyArena = BodyArena::default();
        let mut registry = CollisionRegistry::new();
        let key = player(&mut arena, &mut registry, Vec2::new(300.0, 100.0));

        arena[key].request_move(Direction::Up, 16.0);
        let report = registry.simulate_movement(&mut arena, &grid, &not_water);

        assert_eq!(arena[key].position(), Vec2::new(300.0, 100.0));
        assert!(matches!(
            report.outcome_for(key),
            Some(MovementOutcome::BlockedByObstacle { .. })
        ));
        assert!(arena[key].pending_movement().is_none());
    }

    #[test]
    fn unwalkable_destination_tile_rejects_move() {
        let mut raw = RawChunkData::filled(16, 12, GRASS);
        // tile column 2, row 5 of chunk (0,1) covers x 288..304, y 80..96
        raw.tiles[5 * 16 + 2] = WATER;
        let grid = grid_with(vec![(GridPosition::new(0, 1), raw)]);
        let mut arena: BodyArena = BodyArena::default();
        let mut registry = CollisionRegistry::new();
        let key = player(&mut arena, &mut registry, Vec2::new(300.0, 100.0));

        arena[key].request_move(Direction::Up, 16.0);
        let report = registry.simulate_movement(&mut arena, &grid, &not_water);

        assert_eq!(arena[key].position(), Vec2::new(300.0, 100.0));
        assert_eq!(
            report.outcome_for(key),
            Some(MovementOutcome::BlockedByTile {
                verdict: TileVerdict::Blocked
            })
        );
    }

    #[test]
    fn flying_body_ignores_obstacles_and_tiles() {
        let mut raw = RawChunkData::filled(16, 12, WATER);
        raw.obstacles
            .push(Aabb::new(Vec2::new(36.0, 70.0), Vec2::new(52.0, 90.0)));
        let grid = grid_with(vec![(GridPosition::new(0, 1), raw)]);
        let mut arena: BodyArena = BodyArena::default();
        let mut registry = CollisionRegistry::new();
        let bird = MovableBody::new(Vec2::new(300.0, 100.0), Vec2::new(8.0, 8.0))
            .expect("body")
            .flying();
        let key = arena.insert(bird);
        registry.register(&arena, key).expect("register");

        arena[key].request_move(Direction::Up, 16.0);
        registry.simulate_movement(&mut arena, &grid, &not_water);
        assert_eq!(arena[key].position(), Vec2::new(300.0, 84.0));
    }

    #[test]
    fn second_pass_without_new_request_does_not_move() {
        let grid = open_field();
        let mut arena: BodyArena = BodyArena::default();
        let mut registry = CollisionRegistry::new();
        let key = player(&mut arena, &mut registry, Vec2::new(300.0, 100.0));

        arena[key].request_move(Direction::Right, 10.0);
        registry.simulate_movement(&mut arena, &grid, &not_water);
        let after_first = arena[key].position();
        let report = registry.simulate_movement(&mut arena, &grid, &not_water);

        assert_eq!(after_first, Vec2::new(310.0, 100.0));
        assert_eq!(arena[key].position(), after_first);
        assert!(report.outcomes.is_empty());
    }

    #[test]
    fn latest_request_before_simulation_wins() {
        let grid = open_field();
        let mut arena: BodyArena = BodyArena::default();
        let mut registry = CollisionRegistry::new();
        let key = player(&mut arena, &mut registry, Vec2::new(300.0, 100.0));

        arena[key].request_move(Direction::Up, 16.0);
        arena[key].request_move(Direction::Down, 4.0);
        registry.simulate_movement(&mut arena, &grid, &not_water);
        assert_eq!(arena[key].position(), Vec2::new(300.0, 104.0));
    }

    #[test]
    fn removed_body_is_pruned_on_next_pass() {
        let grid = open_field();
        let mut arena: BodyArena = BodyArena::default();
        let mut registry = CollisionRegistry::new();
        let keep = player(&mut arena, &mut registry, Vec2::new(300.0, 100.0));
        let gone = player(&mut arena, &mut registry, Vec2::new(320.0, 100.0));
        assert_eq!(registry.len(), 2);

        arena.remove(gone);
        let report = registry.simulate_movement(&mut arena, &grid, &not_water);

        assert_eq!(registry.len(), 1);
        assert_eq!(report.pruned, 1);
        assert!(registry.contains(keep));
        assert!(!registry.contains(gone));
    }

    #[test]
    fn reused_slot_does_not_revive_stale_key() {
        let grid = open_field();
        let mut arena: BodyArena = BodyArena::default();
        let mut registry = CollisionRegistry::new();
        let stale = player(&mut arena, &mut registry, Vec2::new(300.0, 100.0));
        arena.remove(stale);
        let fresh = arena.insert(
            MovableBody::new(Vec2::new(310.0, 100.0), Vec2::new(8.0, 8.0)).expect("body"),
        );
        arena[fresh].request_move(Direction::Up, 8.0);

        registry.simulate_movement(&mut arena, &grid, &not_water);

        assert_ne!(stale, fresh);
        assert!(registry.is_empty());
        assert_eq!(arena[fresh].position(), Vec2::new(310.0, 100.0));
        assert!(arena[fresh].pending_movement().is_some());
    }

    #[test]
    fn zero_extent_body_is_rejected() {
        assert_eq!(
            MovableBody::new(Vec2::new(0.0, 0.0), Vec2::new(0.0, 8.0)),
            Err(BodyError::InvalidGeometry {
                width: 0.0,
                height: 8.0
            })
        );
        assert!(MovableBody::new(Vec2::new(0.0, 0.0), Vec2::new(8.0, -1.0)).is_err());
        assert!(MovableBody::new(Vec2::new(f32::NAN, 0.0), Vec2::new(8.0, 8.0)).is_err());
    }

    #[test]
    fn register_refuses_stale_key_and_degenerate_collider() {
        struct Sliver {
            center: Vec2,
        }

        impl Collidable for Sliver {
            fn position(&self) -> Vec2 {
                self.center
            }
            fn bounding_box(&self) -> Aabb {
                Aabb::new(self.center, Vec2::new(self.center.x, self.center.y + 4.0))
            }
            fn request_movement(&mut self, _request: MovementRequest) {}
            fn claim_pending_movement(&mut self) -> Option<MovementRequest> {
                None
            }
            fn apply_position(&mut self, center: Vec2) {
                self.center = center;
            }
        }

        let mut arena: BodyArena<Sliver> = BodyArena::default();
        let mut registry = CollisionRegistry::new();
        let key = arena.insert(Sliver { center: Vec2::ZERO });
        assert!(matches!(
            registry.register(&arena, key),
            Err(CollisionError::Body(BodyError::InvalidGeometry { .. }))
        ));
        arena.remove(key);
        assert_eq!(registry.register(&arena, key), Err(CollisionError::StaleBody));
        assert!(registry.is_empty());
    }

    #[test]
    fn non_finite_or_negative_distance_is_noop() {
        let grid = open_field();
        let mut arena: BodyArena = BodyArena::default();
        let mut registry = CollisionRegistry::new();
        let key = player(&mut arena, &mut registry, Vec2::new(300.0, 100.0));

        for distance in [f32::NAN, f32::INFINITY, -4.0] {
            arena[key].request_move(Direction::Left, distance);
            let report = registry.simulate_movement(&mut arena, &grid, &not_water);
            assert_eq!(report.outcome_for(key), Some(MovementOutcome::Ignored));
            assert_eq!(arena[key].position(), Vec2::new(300.0, 100.0));
            assert!(arena[key].pending_movement().is_none());
        }
    }

    #[test]
    fn only_the_crosser_may_enter_an_unstreamed_cell() {
        let grid = open_field();
        let mut arena: BodyArena = BodyArena::default();
        let mut registry = CollisionRegistry::new();
        let npc = player(&mut arena, &mut registry, Vec2::new(260.0, 100.0));
        let crosser = player(&mut arena, &mut registry, Vec2::new(260.0, 140.0));

        arena[npc].request_move(Direction::Left, 8.0);
        arena[crosser].request_move(Direction::Left, 8.0);
        let report =
            registry.simulate_movement_with_crosser(&mut arena, &grid, &not_water, crosser);

        assert_eq!(
            report.outcome_for(npc),
            Some(MovementOutcome::BlockedByTile {
                verdict: TileVerdict::Unstreamed
            })
        );
        assert_eq!(arena[npc].position(), Vec2::new(260.0, 100.0));
        assert_eq!(arena[crosser].position(), Vec2::new(252.0, 140.0));

        arena[crosser].request_move(Direction::Left, 8.0);
        let report = registry.simulate_movement(&mut arena, &grid, &not_water);
        assert_eq!(
            report.outcome_for(crosser),
            Some(MovementOutcome::BlockedByTile {
                verdict: TileVerdict::Unstreamed
            })
        );
    }

    #[test]
    fn off_grid_destination_is_rejected_even_for_the_crosser() {
        let grid = open_field();
        let mut arena: BodyArena = BodyArena::default();
        let mut registry = CollisionRegistry::new();
        let edge = player(&mut arena, &mut registry, Vec2::new(300.0, 4.0));

        arena[edge].request_move(Direction::Up, 8.0);
        let report =
            registry.simulate_movement_with_crosser(&mut arena, &grid, &not_water, edge);
        assert_eq!(
            report.outcome_for(edge),
            Some(MovementOutcome::BlockedByTile {
                verdict: TileVerdict::OutsideGrid
            })
        );
        assert_eq!(arena[edge].position(), Vec2::new(300.0, 4.0));
    }

    #[test]
    fn bodies_resolve_in_registration_order_without_interacting() {
        let grid = open_field();
        let mut arena: BodyArena = BodyArena::default();
        let mut registry = CollisionRegistry::new();
        let first = player(&mut arena, &mut registry, Vec2::new(300.0, 100.0));
        let second = player(&mut arena, &mut registry, Vec2::new(300.0, 100.0));

        arena[second].request_move(Direction::Down, 8.0);
        arena[first].request_move(Direction::Up, 8.0);
        let report = registry.simulate_movement(&mut arena, &grid, &not_water);

        let order: Vec<BodyKey> = report.outcomes.iter().map(|(key, _)| *key).collect();
        assert_eq!(order, vec![first, second]);
        assert_eq!(arena[first].position(), Vec2::new(300.0, 92.0));
        assert_eq!(arena[second].position(), Vec2::new(300.0, 108.0));
    }

    #[test]
    fn unregister_removes_entry_once() {
        let mut arena: BodyArena = BodyArena::default();
        let mut registry = CollisionRegistry::new();
        let key = player(&mut arena, &mut registry, Vec2::new(300.0, 100.0));
        registry.register(&arena, key).expect("idempotent");
        assert_eq!(registry.len(), 1);
        assert!(registry.unregister(key));
        assert!(!registry.unregister(key));
    }
}
