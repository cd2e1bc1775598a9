//! QuizGap · Diagnostic Quiz Backend
//!
//! - Axum HTTP API
//! - AI-generated diagnostic reports, validated and recomputed before they are served
//! - Optional OpenAI integration (via environment variables); local analyst otherwise
//! - Bearer token verification (JWKS → shared secret → flagged unverified)
//!
//! Important env variables:
//!   PORT                  : u16 (default 3000)
//!   OPENAI_API_KEY        : enables OpenAI integration if present
//!   OPENAI_BASE_URL       : default "https://api.openai.com/v1"
//!   OPENAI_MODEL          : default "gpt-4o-mini"
//!   OPENAI_TIMEOUT_SECS   : default 90
//!   SUPABASE_URL          : identity provider base; JWKS at {SUPABASE_URL}/.well-known/jwks.json
//!   AUTH_JWKS_URL         : explicit JWKS URL (overrides the derived one)
//!   SUPABASE_JWT_SECRET   : HS256 shared secret (falls back to SUPABASE_ANON_KEY)
//!   AUTH_AUDIENCE         : expected `aud`, unchecked when unset
//!   AUTH_REQUIRE_VERIFIED : "true" refuses tokens whose signature could not be verified
//!   ANALYST_CONFIG_PATH   : path to TOML config (prompts, score policy, cache limits, topic catalog)
//!   LOG_LEVEL             : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT            : "pretty" (default) or "json"

mod telemetry;
mod util;
mod error;
mod taxonomy;
mod domain;
mod scoring;
mod assembler;
mod catalog;
mod cache;
mod auth;
mod config;
mod analyst;
mod openai;
mod local;
mod guidance;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument, warn};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (analyst, cache gate, verifier, report store).
  let state = Arc::new(AppState::new());

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "quizgap_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(target: "quizgap_backend", error = %e, "Failed to listen for shutdown signal");
      }
    })
    .await?;

  state.cache.store().clear().await;
  info!(target: "quizgap_backend", "Shut down");
  Ok(())
}
