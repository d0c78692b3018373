//! QuestScribe tracker binary.
//!
//! Loads configuration, sets up structured logging, optionally opens a
//! project file, and serves the editor's command surface until `Ctrl-C`.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `questscribe-config.yaml` (or
//!    `QUESTSCRIBE_CONFIG`), falling back to defaults
//! 2. Initialize tracing; `RUST_LOG` takes precedence over the config level
//! 3. Build the shared project state
//! 4. Open the autoload project, if one is configured
//! 5. Serve HTTP

mod config;
mod error;

use std::path::PathBuf;
use std::sync::Arc;

use questscribe_server::{AppState, ServerConfig, start_server};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH, LoggingConfig};
use crate::error::AppError;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let (config, config_path, found) = load_config()?;

    init_tracing(&config.logging);
    info!("questscribe starting");
    if found {
        info!(path = %config_path.display(), "Configuration loaded");
    } else {
        info!(path = %config_path.display(), "Config file not found, using defaults");
    }

    let state = Arc::new(
        AppState::new().with_default_entity_color(config.project.default_entity_color.clone()),
    );

    if let Some(path) = config.project.autoload.clone() {
        match state.load_from(path.clone()).await {
            Ok(loaded) => info!(
                path = %path.display(),
                entities = loaded.entities.len(),
                markers = loaded.markers.len(),
                repaired_fields = loaded.repaired_fields,
                "Autoloaded project"
            ),
            Err(e) => warn!(
                path = %path.display(),
                error = %e,
                "Autoload failed, starting with an empty project"
            ),
        }
    }

    let server_config = ServerConfig {
        host: config.server.host,
        port: config.server.port,
    };
    start_server(&server_config, state).await?;

    info!("questscribe stopped");
    Ok(())
}

/// Resolve the config path and load it, using defaults when the file is
/// absent. Returns the config, the path consulted, and whether it existed.
fn load_config() -> Result<(AppConfig, PathBuf, bool), AppError> {
    let path = std::env::var_os(CONFIG_PATH_ENV)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);

    if path.exists() {
        let config = AppConfig::from_file(&path)?;
        Ok((config, path, true))
    } else {
        let config = AppConfig::parse("")?;
        Ok((config, path, false))
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}
