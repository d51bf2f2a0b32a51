use std::process::ExitCode;

use overworld_engine::{
    BoundaryEvent, ChunkLoader, Collidable, FrameReport, GridPosition, MovementOutcome, Overworld,
    OverworldConfig, OverworldError, ScrollProgress, TileWalkabilityTable, Vec2,
};
use tracing::{debug, error, info};

use super::bootstrap::AppWiring;
use super::input::{InputAction, PlayerInput};
use super::route::DemoRoute;

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let AppWiring { content, route } = app;
    let started = start_session(
        &content.config,
        &route,
        content.chunks,
        content.tile_types,
    );
    let mut session = match started {
        Ok(session) => session,
        Err(err) => {
            error!(error = %err, "overworld_start_failed");
            return ExitCode::FAILURE;
        }
    };

    let summary = session.run_route(&route);
    info!(
        frames = summary.frames,
        scrolls_started = summary.scrolls_started,
        scrolls_finished = summary.scrolls_finished,
        clamps = summary.clamps,
        obstacle_blocks = summary.obstacle_blocks,
        tile_blocks = summary.tile_blocks,
        refused_moves = summary.refused_moves,
        final_chunk = %summary.final_chunk,
        final_x = summary.final_position.x,
        final_y = summary.final_position.y,
        quit = summary.quit,
        "demo_route_finished"
    );
    ExitCode::SUCCESS
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct DemoSummary {
    pub(crate) frames: u64,
    pub(crate) scrolls_started: u32,
    pub(crate) scrolls_finished: u32,
    pub(crate) clamps: u32,
    pub(crate) obstacle_blocks: u32,
    pub(crate) tile_blocks: u32,
    pub(crate) refused_moves: u32,
    pub(crate) final_chunk: GridPosition,
    pub(crate) final_position: Vec2,
    pub(crate) quit: bool,
}

/// Couples an overworld to its content and a scripted input device.
pub(crate) struct DemoSession<L, T> {
    overworld: Overworld,
    loader: L,
    table: T,
    input: PlayerInput,
}

impl<L: ChunkLoader, T: TileWalkabilityTable> DemoSession<L, T> {
    pub(crate) fn new(overworld: Overworld, loader: L, table: T) -> Self {
        Self {
            overworld,
            loader,
            table,
            input: PlayerInput::default(),
        }
    }

    pub(crate) fn overworld(&self) -> &Overworld {
        &self.overworld
    }

    /// Input first, then the overworld update. `None` once quit is held.
    pub(crate) fn step_frame(
        &mut self,
        held: Option<InputAction>,
        step_px: f32,
        dt_seconds: f32,
    ) -> Option<FrameStep> {
        self.input.hold_only(held);
        if self.input.quit_requested() {
            info!("quit_requested");
            return None;
        }

        let refused = match self.input.movement_direction() {
            Some(direction) => !self.overworld.request_player_move(direction, step_px),
            None => held.is_some() && !self.input.is_enabled(),
        };

        let report = self
            .overworld
            .update(dt_seconds, &mut self.loader, &self.table, &mut self.input);
        Some(FrameStep { report, refused })
    }

    pub(crate) fn run_route(&mut self, route: &DemoRoute) -> DemoSummary {
        let mut summary = DemoSummary {
            frames: 0,
            scrolls_started: 0,
            scrolls_finished: 0,
            clamps: 0,
            obstacle_blocks: 0,
            tile_blocks: 0,
            refused_moves: 0,
            final_chunk: self.overworld.active_position(),
            final_position: self.player_position(),
            quit: false,
        };
        let player = self.overworld.player_key();
        let step_px = route.step_px();

        for held in route.frames() {
            let Some(step) = self.step_frame(held, step_px, route.frame_dt_seconds) else {
                summary.quit = true;
                break;
            };
            summary.frames += 1;
            if step.refused {
                summary.refused_moves += 1;
            }

            match step.report.movement.outcome_for(player) {
                Some(MovementOutcome::BlockedByObstacle { obstacle }) => {
                    summary.obstacle_blocks += 1;
                    debug!(
                        frame = summary.frames,
                        obstacle_min_x = obstacle.min.x,
                        obstacle_min_y = obstacle.min.y,
                        "player_blocked_by_obstacle"
                    );
                }
                Some(MovementOutcome::BlockedByTile { verdict }) => {
                    summary.tile_blocks += 1;
                    debug!(frame = summary.frames, verdict = ?verdict, "player_blocked_by_tile");
                }
                _ => {}
            }

            match step.report.boundary {
                BoundaryEvent::ScrollStarted { .. } => summary.scrolls_started += 1,
                BoundaryEvent::Clamped { .. } => summary.clamps += 1,
                BoundaryEvent::None => {}
            }
            if let ScrollProgress::Finished { target } = step.report.scroll {
                summary.scrolls_finished += 1;
                info!(
                    frame = summary.frames,
                    active = %target,
                    camera_x = step.report.camera.x,
                    camera_y = step.report.camera.y,
                    "active_chunk_changed"
                );
            }
        }

        summary.final_chunk = self.overworld.active_position();
        summary.final_position = self.player_position();
        summary
    }

    fn player_position(&self) -> Vec2 {
        self.overworld
            .player()
            .map(Collidable::position)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FrameStep {
    pub(crate) report: FrameReport,
    pub(crate) refused: bool,
}

pub(crate) fn start_session<L: ChunkLoader, T: TileWalkabilityTable>(
    config: &OverworldConfig,
    route: &DemoRoute,
    mut loader: L,
    table: T,
) -> Result<DemoSession<L, T>, OverworldError> {
    let player = route
        .player
        .body()
        .map_err(|err| OverworldError::Registration(err.into()))?;
    let overworld = Overworld::new(config, route.start, player, &mut loader)?;
    Ok(DemoSession::new(overworld, loader, table))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    use overworld_engine::{load_world_content, AppPaths, RawChunkData, TileId};

    use super::*;
    use crate::app::route::DEMO_ROUTE_FILE;

    #[derive(Default)]
    struct MapLoader {
        chunks: HashMap<GridPosition, RawChunkData>,
    }

    impl ChunkLoader for MapLoader {
        fn load(&mut self, position: GridPosition) -> Option<RawChunkData> {
            self.chunks.get(&position).cloned()
        }
    }

    fn grass_loader(positions: &[(u32, u32)]) -> MapLoader {
        MapLoader {
            chunks: positions
                .iter()
                .map(|(row, column)| {
                    (
                        GridPosition::new(*row, *column),
                        RawChunkData::filled(16, 12, TileId(0)),
                    )
                })
                .collect(),
        }
    }

    fn route(raw_steps: &str) -> DemoRoute {
        let raw = format!(
            r#"{{
                "start": {{ "row": 0, "column": 0 }},
                "player": {{ "x": 248, "y": 96, "half_width": 6, "half_height": 6 }},
                "frame_dt_seconds": 0.25,
                "walk_speed_px_per_second": 16,
                "steps": [{raw_steps}]
            }}"#
        );
        DemoRoute::parse(Path::new("test_route.json"), &raw).expect("route")
    }

    fn walkable(_tile: TileId) -> bool {
        true
    }

    #[test]
    fn walking_off_the_edge_scrolls_and_refuses_input_until_done() {
        let route = route(
            r#"{ "action": "move_right", "frames": 2 }, { "action": "move_right", "frames": 8 }"#,
        );
        let mut session = start_session(
            &OverworldConfig::default(),
            &route,
            grass_loader(&[(0, 0), (0, 1)]),
            walkable,
        )
        .expect("session");

        let summary = session.run_route(&route);
        assert_eq!(summary.scrolls_started, 1);
        assert_eq!(summary.scrolls_finished, 1);
        assert_eq!(summary.final_chunk, GridPosition::new(0, 1));
        // 248 -> 252 -> 256 crosses, nudged to 260; frames 3..=10 advance the scroll.
        assert_eq!(summary.refused_moves, 8);
        assert_eq!(summary.final_position, Vec2::new(260.0, 96.0));
        assert_eq!(session.overworld().camera_position(), Vec2::new(256.0, 0.0));
    }

    #[test]
    fn unauthored_neighbour_clamps_the_player() {
        let route = route(r#"{ "action": "move_right", "frames": 2 }"#);
        let mut session = start_session(
            &OverworldConfig::default(),
            &route,
            grass_loader(&[(0, 0)]),
            walkable,
        )
        .expect("session");

        let summary = session.run_route(&route);
        assert_eq!(summary.clamps, 1);
        assert_eq!(summary.scrolls_started, 0);
        assert_eq!(summary.final_chunk, GridPosition::new(0, 0));
        assert_eq!(summary.final_position, Vec2::new(250.0, 96.0));
    }

    #[test]
    fn quit_stops_the_route() {
        let route = route(
            r#"{ "action": "move_left", "frames": 3 }, { "action": "quit" }, { "action": "move_left", "frames": 5 }"#,
        );
        let mut session = start_session(
            &OverworldConfig::default(),
            &route,
            grass_loader(&[(0, 0)]),
            walkable,
        )
        .expect("session");

        let summary = session.run_route(&route);
        assert!(summary.quit);
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.final_position, Vec2::new(236.0, 96.0));
    }

    #[test]
    fn unwalkable_tiles_block_the_player() {
        let route = route(r#"{ "action": "move_up", "frames": 1 }"#);
        let mut session = start_session(
            &OverworldConfig::default(),
            &route,
            grass_loader(&[(0, 0)]),
            |_: TileId| false,
        )
        .expect("session");

        let step = session
            .step_frame(Some(InputAction::MoveUp), 4.0, 0.25)
            .expect("frame");
        assert!(matches!(
            step.report.movement.outcome_for(session.overworld().player_key()),
            Some(MovementOutcome::BlockedByTile { .. })
        ));
        assert_eq!(step.report.boundary, BoundaryEvent::None);
    }

    #[test]
    fn start_outside_the_start_chunk_is_rejected() {
        let mut route = route("");
        route.player.x = 400.0;
        assert!(matches!(
            start_session(
                &OverworldConfig::default(),
                &route,
                grass_loader(&[(0, 0)]),
                walkable,
            ),
            Err(OverworldError::PlayerOutsideStartChunk { .. })
        ));
    }

    #[test]
    fn shipped_demo_route_visits_both_chunks_and_returns() {
        let root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..");
        let paths = AppPaths::under_root(root);
        let content = load_world_content(&paths).expect("shipped content");
        let route = DemoRoute::load(&paths.assets_dir.join(DEMO_ROUTE_FILE)).expect("shipped route");

        let mut session =
            start_session(&content.config, &route, content.chunks, content.tile_types)
                .expect("session");
        let summary = session.run_route(&route);

        assert!(!summary.quit);
        assert_eq!(summary.frames, route.total_frames());
        assert_eq!(summary.scrolls_started, 2);
        assert_eq!(summary.scrolls_finished, 2);
        assert!(summary.obstacle_blocks > 0, "{summary:?}");
        assert!(summary.tile_blocks > 0, "{summary:?}");
        assert!(summary.clamps > 0, "{summary:?}");
        assert_eq!(summary.final_chunk, GridPosition::new(0, 0));
        assert!(!session.overworld().scroll().is_scrolling());
        assert!(session
            .overworld()
            .grid()
            .chunk_at(GridPosition::new(0, 1))
            .is_some());
    }
}
