use anyhow::Result;
use log::{error, info, warn};
use std::sync::Arc;

mod api;
mod colors;
mod config;
mod editor;
mod forms;
mod logging;
mod map_style;
mod ordering;
mod persistence;
mod selectors;
mod server;
mod state;
mod transit_types;

use api::ApiClient;
use config::Config;
use editor::Editor;
use logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration and logging
    let config = Config::from_env()?;
    let _logger = init_logging(config.production)?;
    info!("Using transit API at {}", config.api_url);

    // 2. Editor state
    let api = ApiClient::new(&config.api_url)?;
    let editor = Arc::new(Editor::new(api, config.region, config.data_dir.clone()));

    // 3. Restore the previous session
    if let Err(e) = editor.restore_session().await {
        warn!("Failed to load previous session: {:#}", e);
    }

    // 4. Initial load. The server still starts if the backend is down.
    if let Err(e) = editor.load_lines(config.initial_line.as_deref()).await {
        error!("Initial load of transit lines failed: {}", e);
    }

    // 5. HTTP Server
    info!("Server running at http://localhost:{}", config.port);
    warp::serve(server::routes(editor))
        .run(([0, 0, 0, 0], config.port))
        .await;

    Ok(())
}
