use thiserror::Error;
use tracing::{debug, info, warn};

use super::geometry::{Direction, GridPosition, Vec2};
use super::grid::{ChunkLoader, StreamError, TileMapGrid};

/// Receives the one-way input suppression signal emitted around a scroll.
pub trait InputGate {
    fn disable(&mut self);
    fn enable(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputLatch {
    enabled: bool,
}

impl Default for InputLatch {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl InputLatch {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl InputGate for InputLatch {
    fn disable(&mut self) {
        self.enabled = false;
    }

    fn enable(&mut self) {
        self.enabled = true;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollState {
    pub direction: Direction,
    pub from: GridPosition,
    pub target: GridPosition,
    pub start_position: Vec2,
    pub end_position: Vec2,
    pub elapsed_seconds: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollPhase {
    Idle,
    Scrolling(ScrollState),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollProgress {
    Idle,
    Scrolling { fraction: f32 },
    Finished { target: GridPosition },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScrollError {
    #[error("a scroll {direction:?} is already in progress")]
    AlreadyScrolling { direction: Direction },
    #[error(transparent)]
    Streaming(#[from] StreamError),
}

#[derive(Debug, Clone)]
pub struct ScrollController {
    phase: ScrollPhase,
    camera: Vec2,
    max_duration_seconds: f32,
}

impl ScrollController {
    /// A non-finite or non-positive duration makes every scroll finish on
    /// its first advance.
    pub fn new(camera_top_left: Vec2, max_duration_seconds: f32) -> Self {
        let usable = max_duration_seconds.is_finite() && max_duration_seconds > 0.0;
        let max_duration_seconds = if usable {
            max_duration_seconds
        } else {
            warn!(requested = max_duration_seconds, "scroll_duration_invalid_using_instant");
            0.0
        };
        Self {
            phase: ScrollPhase::Idle,
            camera: camera_top_left,
            max_duration_seconds,
        }
    }

    pub fn phase(&self) -> &ScrollPhase {
        &self.phase
    }

    pub fn is_scrolling(&self) -> bool {
        matches!(self.phase, ScrollPhase::Scrolling(_))
    }

    pub fn camera_position(&self) -> Vec2 {
        self.camera
    }

    pub fn max_duration_seconds(&self) -> f32 {
        self.max_duration_seconds
    }

    /// Moves the idle camera. Ignored while scrolling.
    pub fn snap_camera_to(&mut self, top_left: Vec2) -> bool {
        if self.is_scrolling() {
            return false;
        }
        self.camera = top_left;
        true
    }

    /// Streams in the neighbour of `active` in `direction` and starts moving
    /// the camera toward it. On error the controller stays idle and the gate
    /// is untouched.
    pub fn begin_scroll(
        &mut self,
        direction: Direction,
        active: GridPosition,
        grid: &mut TileMapGrid,
        loader: &mut dyn ChunkLoader,
        gate: &mut dyn InputGate,
    ) -> Result<GridPosition, ScrollError> {
        if let ScrollPhase::Scrolling(state) = self.phase {
            return Err(ScrollError::AlreadyScrolling {
                direction: state.direction,
            });
        }

        let target = active
            .neighbor(direction, grid.width(), grid.height())
            .ok_or(StreamError::OutOfGrid {
                from: active,
                direction,
            })?;
        let end_position = grid.stream_in(target, loader)?.top_left();

        self.phase = ScrollPhase::Scrolling(ScrollState {
            direction,
            from: active,
            target,
            start_position: self.camera,
            end_position,
            elapsed_seconds: 0.0,
        });
        gate.disable();
        info!(
            direction = ?direction,
            from = %active,
            target = %target,
            start_x = self.camera.x,
            start_y = self.camera.y,
            end_x = end_position.x,
            end_y = end_position.y,
            "scroll_started"
        );
        Ok(target)
    }

    pub fn advance(&mut self, dt_seconds: f32, gate: &mut dyn InputGate) -> ScrollProgress {
        let ScrollPhase::Scrolling(mut state) = self.phase else {
            return ScrollProgress::Idle;
        };

        if dt_seconds.is_finite() && dt_seconds > 0.0 {
            state.elapsed_seconds += dt_seconds;
        }

        if state.elapsed_seconds >= self.max_duration_seconds {
            self.camera = state.end_position;
            self.phase = ScrollPhase::Idle;
            gate.enable();
            info!(
                target = %state.target,
                elapsed_seconds = state.elapsed_seconds,
                "scroll_finished"
            );
            return ScrollProgress::Finished {
                target: state.target,
            };
        }

        let fraction =
            state.elapsed_seconds.min(self.max_duration_seconds) / self.max_duration_seconds;
        self.camera = state.start_position.lerp(state.end_position, fraction);
        self.phase = ScrollPhase::Scrolling(state);
        debug!(
            fraction,
            camera_x = self.camera.x,
            camera_y = self.camera.y,
            "scroll_advanced"
        );
        ScrollProgress::Scrolling { fraction }
    }
}
