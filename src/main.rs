//! BeVuiHoc · Primary-school Quiz Backend
//!
//! - Axum HTTP + WebSocket API driving one quiz session
//! - Gemini question generation (via environment variables)
//! - Optional Supabase result history, keyed by a per-install device id
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT               : u16 (default 3000)
//!   GEMINI_API_KEY     : enables quiz generation (API_KEY is accepted too)
//!   GEMINI_BASE_URL    : default "https://generativelanguage.googleapis.com/v1beta"
//!   GEMINI_MODEL       : default "gemini-2.5-flash"
//!   GEMINI_TIMEOUT_SECS: default 120
//!   SUPABASE_URL       : enables remote history together with SUPABASE_ANON_KEY
//!   SUPABASE_ANON_KEY  : anon key sent as apikey + bearer token
//!   QUIZ_CONFIG_PATH   : path to TOML config (prompts, generation, storage)
//!   DEVICE_ID_PATH     : overrides where the device id is persisted
//!   LOG_LEVEL          : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT         : "pretty" (default) or "json"

mod telemetry;
mod util;
mod error;
mod domain;
mod config;
mod device;
mod scoring;
mod session;
mod questions;
mod history;
mod gemini;
mod supabase;
mod state;
mod protocol;
mod logic;
mod routes;
#[cfg(test)]
mod testing;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::LiveState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (config, device id, Gemini, Supabase).
  let state = Arc::new(LiveState::from_env());

  // Pull the remote history in the background; the home screen shows a loading flag meanwhile.
  tokio::spawn({
    let state = state.clone();
    async move { state.refresh_history().await }
  });

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "bevuihoc_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
      info!(target: "bevuihoc_backend", "Shutdown signal received");
    })
    .await?;
  Ok(())
}
