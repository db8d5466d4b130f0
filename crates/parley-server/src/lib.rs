//! Parley server library logic.

pub mod api_ws;
pub mod config;

use axum::{routing::get, Extension, Json, Router};
use config::Config;
use parley_turn::TurnConfig;
use parley_voice::{
    Generator, HttpGenerator, RecognizerFactory, SynthesizerFactory, WsRecognizerFactory,
    WsSynthesizerFactory,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Turn life-cycle tuning applied to every session.
    pub turn_config: TurnConfig,
    /// Opens one recognizer stream per connection.
    pub recognizer_factory: Arc<dyn RecognizerFactory>,
    /// Opens one synthesizer stream per agent turn.
    pub synthesizer_factory: Arc<dyn SynthesizerFactory>,
    /// Starts generation streams for committed utterances.
    pub generator: Arc<dyn Generator>,
}

impl AppState {
    /// Builds production state backed by the vendor streaming clients.
    pub fn from_config(config: &Config) -> Self {
        Self {
            turn_config: config.turn.clone(),
            recognizer_factory: Arc::new(WsRecognizerFactory::new(
                config.voice.recognizer.clone(),
            )),
            synthesizer_factory: Arc::new(WsSynthesizerFactory::new(
                config.voice.synthesizer.clone(),
            )),
            generator: Arc::new(HttpGenerator::new(config.voice.generator.clone())),
        }
    }
}

/// Health check handler.
///
/// Returns `200 OK` with server status and version. Used by load balancers,
/// monitoring, and CI to verify the server is running.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(api_ws::ws_handler))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
}
