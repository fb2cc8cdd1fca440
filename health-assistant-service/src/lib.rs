pub mod clients;
pub mod config;
pub mod models;
pub mod service;

pub use config::ServiceConfig;
pub use models::*;
pub use service::{AppState, build_router};

/// Build the application router from the process configuration and start the idle
/// session sweeper. Must be called from within a Tokio runtime.
pub fn create_app(config: &ServiceConfig) -> anyhow::Result<axum::Router> {
    let pipeline = config.pipeline()?;
    let state = AppState::new(clients::collaborators(config), &pipeline)?;
    state.spawn_session_sweeper(&pipeline.sessions);
    Ok(build_router(state))
}
