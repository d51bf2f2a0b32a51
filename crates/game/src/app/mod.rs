use std::process::ExitCode;

use tracing::error;

mod bootstrap;
mod input;
mod loop_runner;
mod route;

pub(crate) fn run() -> ExitCode {
    match bootstrap::build_app() {
        Ok(app) => loop_runner::run(app),
        Err(err) => {
            error!(error = %err, "startup_failed");
            ExitCode::FAILURE
        }
    }
}
