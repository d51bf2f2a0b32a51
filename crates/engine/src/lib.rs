use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod config;
pub mod content;
pub mod world;

pub use config::{ChunkLayout, ConfigError, OverworldConfig, CONFIG_FILE_NAME};
pub use content::{
    load_world_content, ChunkCatalog, ChunkContentError, ContentError, SourceLocation, TileType,
    TileTypeError, TileTypeErrorCode, TileTypeTable, WorldContent,
};
pub use world::{
    Aabb, BodyArena, BodyError, BodyKey, BoundaryEvent, ChunkLoader, Collidable, CollisionError,
    CollisionRegistry, Direction, FrameReport, GridPosition, InputGate, InputLatch, MovableBody,
    MovementOutcome, MovementReport, MovementRequest, Overworld, OverworldError, RawChunkData,
    ScrollController, ScrollError, ScrollPhase, ScrollProgress, ScrollState, StreamError, TileId,
    TileMap, TileMapError, TileMapGrid, TileVerdict, TileWalkabilityTable, Vec2,
};

pub const ROOT_ENV_VAR: &str = "OVERWORLD_ROOT";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub assets_dir: PathBuf,
    pub config_path: PathBuf,
    pub chunks_dir: PathBuf,
    pub tile_types_path: PathBuf,
}

impl AppPaths {
    pub fn under_root(root: PathBuf) -> Self {
        let assets_dir = root.join("assets").join("overworld");
        Self {
            config_path: assets_dir.join(CONFIG_FILE_NAME),
            chunks_dir: assets_dir.join("chunks"),
            tile_types_path: assets_dir.join("tile_types.xml"),
            assets_dir,
            root,
        }
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error(
        "OVERWORLD_ROOT is set but does not point to a valid project root: {path}\n\
A valid root must contain Cargo.toml and either crates/ or assets/."
    )]
    InvalidEnvRoot { path: PathBuf },
    #[error(
        "Could not detect project root by walking upward from executable directory: {start_dir}\n\
Expected a directory containing Cargo.toml and either crates/ or assets/.\n\
Set {env_var} explicitly, for example:\n\
Bash/zsh: export {env_var}=\"/path/to/overworld\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    Ok(AppPaths::under_root(resolve_root()?))
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let raw = PathBuf::from(value);
            let normalized = normalize_path(&raw);
            if is_repo_marker(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;

            for candidate in exe_dir.ancestors() {
                if is_repo_marker(candidate) {
                    return Ok(normalize_path(candidate));
                }
            }

            Err(StartupError::RootNotFound {
                start_dir: normalize_path(&exe_dir),
                env_var: ROOT_ENV_VAR,
            })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn is_repo_marker(path: &Path) -> bool {
    let cargo_toml = path.join("Cargo.toml").is_file();
    let has_crates = path.join("crates").is_dir();
    let has_assets = path.join("assets").is_dir();

    cargo_toml && (has_crates || has_assets)
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn repo_marker_requires_cargo_toml() {
        let cwd = env::current_dir().expect("cwd");
        assert!(!is_repo_marker(&cwd.join("definitely_not_a_marker")));
    }

    #[test]
    fn repo_marker_accepts_cargo_toml_with_assets() {
        let temp = TempDir::new().expect("temp");
        fs::write(temp.path().join("Cargo.toml"), "[workspace]").expect("cargo toml");
        assert!(!is_repo_marker(temp.path()));
        fs::create_dir_all(temp.path().join("assets")).expect("assets");
        assert!(is_repo_marker(temp.path()));
    }

    #[test]
    fn content_paths_live_under_assets_overworld() {
        let paths = AppPaths::under_root(PathBuf::from("/game"));
        assert_eq!(paths.assets_dir, Path::new("/game/assets/overworld"));
        assert_eq!(paths.chunks_dir, Path::new("/game/assets/overworld/chunks"));
        assert!(paths.tile_types_path.ends_with("tile_types.xml"));
        assert!(paths.config_path.ends_with(CONFIG_FILE_NAME));
    }
}
