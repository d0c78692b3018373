//! Serving the command surface.
//!
//! The binary builds one [`AppState`], opens the autoload project into it
//! (if configured), and only then calls [`start_server`], so the first
//! request already sees the loaded project. Serving stops on `Ctrl-C`;
//! in-flight commands finish first. Nothing is saved on the way out; unsaved
//! changes are only reported.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::router::build_router;
use crate::state::AppState;

/// Listener address for the command surface.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind, normally loopback since the editor runs locally.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl ServerConfig {
    /// Resolve `host:port` into a socket address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the pair is not a valid address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ServerError> {
        let text = format!("{}:{}", self.host, self.port);
        text.parse::<SocketAddr>()
            .map_err(|e| ServerError::Bind(format!("invalid address {text}: {e}")))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: 7878,
        }
    }
}

/// Serve `state` until `Ctrl-C`.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the address is invalid or taken, and
/// [`ServerError::Serve`] if the accept loop fails.
pub async fn start_server(config: &ServerConfig, state: Arc<AppState>) -> Result<(), ServerError> {
    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {addr}: {e}")))?;

    let opened = state.status().await;
    info!(
        %addr,
        entities = opened.entities,
        markers = opened.markers,
        path = ?opened.path,
        "QuestScribe tracker listening"
    );

    axum::serve(listener, build_router(Arc::clone(&state)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ServerError::Serve(e.to_string()))?;

    let closing = state.status().await;
    if closing.dirty {
        warn!(
            revision = closing.revision,
            path = ?closing.path,
            "stopping with unsaved project changes"
        );
    }
    info!("QuestScribe tracker stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C, stopping now");
    }
}

/// Errors raised while starting or running the listener.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The address was invalid or could not be bound.
    #[error("bind error: {0}")]
    Bind(String),

    /// The accept loop failed.
    #[error("serve error: {0}")]
    Serve(String),
}
