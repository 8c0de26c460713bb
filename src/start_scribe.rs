//! Startup helpers for the Scribe share server.

use std::process::ExitCode;
use std::sync::Arc;

use crate::api::ApiClient;
use crate::share::server::{self, ShareState};

/// Environment variable for the share server port.
pub const PORT_ENV: &str = "SCRIBE_SHARE_PORT";

/// Environment variable for the public origin share links are built on.
pub const ORIGIN_ENV: &str = "SCRIBE_SHARE_ORIGIN";

/// Install the global `tracing` subscriber (`RUST_LOG`, default `info`).
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();
}

/// Run the share server (used by the `scribe-share` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    init_tracing();

    tracing::info!("Starting Scribe share server v{}", env!("CARGO_PKG_VERSION"));

    let state = match initialize() {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to create state: {e}");
            return ExitCode::from(1);
        }
    };

    let port = get_port();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(server::run_server_with_shutdown(state, port, shutdown_signal())) {
        tracing::error!("Server error: {e}");
        return ExitCode::from(1);
    }

    tracing::info!("Share server stopped");
    ExitCode::SUCCESS
}

/// Build share state from the environment without starting the server.
///
/// # Errors
/// Returns an error if the backend client cannot be created.
pub fn initialize() -> Result<Arc<ShareState>, Box<dyn std::error::Error + Send + Sync>> {
    let client = ApiClient::from_env()?;
    tracing::info!("Conversation backend: {}", client.config().base_url);

    let origin = get_origin();
    tracing::info!("Share links use origin {origin}");

    Ok(ShareState::new(Arc::new(client), origin))
}

/// Get configured server port.
#[must_use]
pub fn get_port() -> u16 {
    std::env::var(PORT_ENV)
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(server::DEFAULT_PORT)
}

/// Get configured public origin.
#[must_use]
pub fn get_origin() -> String {
    std::env::var(ORIGIN_ENV)
        .ok()
        .filter(|o| !o.trim().is_empty())
        .unwrap_or_else(|| server::DEFAULT_ORIGIN.to_string())
}

/// Resolves on Ctrl+C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
