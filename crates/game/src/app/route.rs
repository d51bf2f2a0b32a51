use std::fs;
use std::path::{Path, PathBuf};

use overworld_engine::{BodyError, GridPosition, MovableBody, Vec2};
use serde::Deserialize;
use thiserror::Error;

use super::input::InputAction;

pub(crate) const DEMO_ROUTE_FILE: &str = "demo_route.json";

#[derive(Debug, Error)]
pub(crate) enum RouteError {
    #[error("failed to read route {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse route {path} at {json_path}: {source}")]
    Parse {
        path: PathBuf,
        json_path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("route {path} has frame_dt_seconds {value}; expected a positive finite number")]
    InvalidFrameDt { path: PathBuf, value: f32 },
    #[error("route {path} player is invalid: {source}")]
    Player {
        path: PathBuf,
        #[source]
        source: BodyError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct PlayerSpawn {
    pub(crate) x: f32,
    pub(crate) y: f32,
    pub(crate) half_width: f32,
    pub(crate) half_height: f32,
}

impl PlayerSpawn {
    pub(crate) fn body(&self) -> Result<MovableBody, BodyError> {
        MovableBody::new(
            Vec2::new(self.x, self.y),
            Vec2::new(self.half_width, self.half_height),
        )
    }
}

/// One held action (or nothing) for a run of frames.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RouteStep {
    #[serde(default)]
    pub(crate) action: Option<InputAction>,
    #[serde(default = "default_step_frames")]
    pub(crate) frames: u32,
}

fn default_step_frames() -> u32 {
    1
}

/// Scripted input that stands in for a keyboard in the headless demo.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct DemoRoute {
    pub(crate) start: GridPosition,
    pub(crate) player: PlayerSpawn,
    pub(crate) frame_dt_seconds: f32,
    pub(crate) walk_speed_px_per_second: f32,
    pub(crate) steps: Vec<RouteStep>,
}

impl DemoRoute {
    pub(crate) fn load(path: &Path) -> Result<Self, RouteError> {
        let raw = fs::read_to_string(path).map_err(|source| RouteError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &raw)
    }

    pub(crate) fn parse(path: &Path, raw: &str) -> Result<Self, RouteError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let route: DemoRoute =
            serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
                let json_path = error.path().to_string();
                RouteError::Parse {
                    path: path.to_path_buf(),
                    json_path,
                    source: error.into_inner(),
                }
            })?;

        if !route.frame_dt_seconds.is_finite() || route.frame_dt_seconds <= 0.0 {
            return Err(RouteError::InvalidFrameDt {
                path: path.to_path_buf(),
                value: route.frame_dt_seconds,
            });
        }
        if let Err(source) = route.player.body() {
            return Err(RouteError::Player {
                path: path.to_path_buf(),
                source,
            });
        }
        Ok(route)
    }

    pub(crate) fn step_px(&self) -> f32 {
        self.walk_speed_px_per_second * self.frame_dt_seconds
    }

    pub(crate) fn total_frames(&self) -> u64 {
        self.steps.iter().map(|step| u64::from(step.frames)).sum()
    }

    /// Per-frame held action, step by step.
    pub(crate) fn frames(&self) -> impl Iterator<Item = Option<InputAction>> + '_ {
        self.steps
            .iter()
            .flat_map(|step| std::iter::repeat(step.action).take(step.frames as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROUTE: &str = r#"{
        "start": { "row": 0, "column": 0 },
        "player": { "x": 128, "y": 100, "half_width": 6, "half_height": 6 },
        "frame_dt_seconds": 0.5,
        "walk_speed_px_per_second": 8,
        "steps": [
            { "action": "move_right", "frames": 2 },
            { "frames": 3 },
            { "action": "quit" }
        ]
    }"#;

    fn parse(raw: &str) -> Result<DemoRoute, RouteError> {
        DemoRoute::parse(Path::new("demo_route.json"), raw)
    }

    #[test]
    fn parses_route_and_expands_frames() {
        let route = parse(ROUTE).expect("route");
        assert_eq!(route.start, GridPosition::new(0, 0));
        assert_eq!(route.step_px(), 4.0);
        assert_eq!(route.total_frames(), 6);
        assert_eq!(
            route.frames().collect::<Vec<_>>(),
            vec![
                Some(InputAction::MoveRight),
                Some(InputAction::MoveRight),
                None,
                None,
                None,
                Some(InputAction::Quit),
            ]
        );
    }

    #[test]
    fn parse_error_names_json_path() {
        let raw = ROUTE.replace("\"quit\"", "\"jump\"");
        match parse(&raw).expect_err("unknown action") {
            RouteError::Parse { json_path, .. } => assert_eq!(json_path, "steps[2].action"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn non_positive_frame_dt_is_rejected() {
        let raw = ROUTE.replace("0.5", "0");
        assert!(matches!(
            parse(&raw),
            Err(RouteError::InvalidFrameDt { .. })
        ));
    }

    #[test]
    fn degenerate_player_is_rejected() {
        let raw = ROUTE.replace("\"half_width\": 6", "\"half_width\": 0");
        assert!(matches!(parse(&raw), Err(RouteError::Player { .. })));
    }
}
