use std::path::PathBuf;

use overworld_engine::{
    load_world_content, resolve_app_paths, ContentError, StartupError, WorldContent,
};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::route::{DemoRoute, RouteError, DEMO_ROUTE_FILE};

const ROUTE_ENV_VAR: &str = "OVERWORLD_DEMO_ROUTE";

#[derive(Debug, Error)]
pub(crate) enum BootstrapError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Route(#[from] RouteError),
}

pub(crate) struct AppWiring {
    pub(crate) content: WorldContent,
    pub(crate) route: DemoRoute,
}

pub(crate) fn build_app() -> Result<AppWiring, BootstrapError> {
    init_tracing();
    info!("=== Overworld Startup ===");

    let paths = resolve_app_paths()?;
    info!(root = %paths.root.display(), "project_root_resolved");
    let content = load_world_content(&paths)?;

    let route_path =
        route_path_from_env().unwrap_or_else(|| paths.assets_dir.join(DEMO_ROUTE_FILE));
    let route = DemoRoute::load(&route_path)?;
    info!(
        path = %route_path.display(),
        steps = route.steps.len(),
        frames = route.total_frames(),
        "demo_route_loaded"
    );

    Ok(AppWiring { content, route })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn route_path_from_env() -> Option<PathBuf> {
    std::env::var(ROUTE_ENV_VAR)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .map(PathBuf::from)
}
