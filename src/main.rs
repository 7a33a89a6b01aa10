//! Narubot · Webex chat bot backend
//!
//! - Axum webhook receiver for Webex messages and adaptive-card submissions
//! - Free-form chat through Vertex AI or an OpenAI-compatible endpoint
//! - Personality quiz with per-room progress in a session store
//!
//! Important env variables:
//!   PORT               : u16 (default 8081)
//!   WEBEX_ACCESS_TOKEN : bot token (required)
//!   BOT_EMAIL          : the bot's own address; its events are ignored
//!   AI_BACKEND         : "vertex", "openai" or "none" (inferred from credentials when unset)
//!   SESSION_STORE_URL  : "memory" or a sqlite url (default "sqlite://narubot.db?mode=rwc")
//!   QUIZ_CONFIG_PATH   : TOML/JSON with questions, characters and prompts
//!   BOT_SECRETS_PATH   : optional JSON file with the same keys (env wins)
//!   LOG_LEVEL          : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT         : "pretty" (default) or "json"

mod ai;
mod cards;
mod config;
mod domain;
mod error;
mod logic;
mod openai;
mod protocol;
mod quiz;
mod result;
mod routes;
mod state;
mod store;
mod telemetry;
mod vertex;
mod webex;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::Settings;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let settings = Settings::from_env().map_err(|e| {
    error!(target: "narubot", error = %e, "Invalid configuration");
    e
  })?;

  // Build shared application state (session store, Webex client, AI backend, quiz bank).
  let state = Arc::new(AppState::from_settings(&settings).await?);

  let app = build_router(state);

  let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
  let listener = TcpListener::bind(addr).await?;
  info!(target: "narubot", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "narubot", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    error!(target: "narubot", error = %e, "Failed to listen for shutdown signal");
  }
}
