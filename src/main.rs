//! Questline · quest progression and reward ledger backend
//!
//! - Axum HTTP + WebSocket API
//! - Document store, in memory with an optional JSON snapshot
//! - Optional OpenAI integration for the tutor and draft generation
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   APP_CONFIG_PATH     : path to TOML config (prompts, engine, store, limits, messages)
//!   STORE_PATH          : JSON snapshot file; overrides [store].snapshot_path
//!   OPENAI_API_KEY      : enables the tutor if present
//!   OPENAI_BASE_URL     : default "https://api.openai.com/v1"
//!   OPENAI_FAST_MODEL   : default "gpt-4o-mini"
//!   OPENAI_STRONG_MODEL : default "gpt-4o"
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod error;
mod config;
mod seeds;
mod engine;
mod store;
mod ledger;
mod accounts;
mod tutor;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::config::load_app_config_from_env;
use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Config, store (seeded on first run), ledger and tutor client.
  let config = load_app_config_from_env();
  let state = Arc::new(AppState::new(config).await?);

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "questline", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "questline", error = %e, "Failed to listen for shutdown signal");
    return;
  }
  info!(target: "questline", "Shutdown signal received");
}
