//! Health check endpoint
//!
//! Never touches the generation gate, so it answers while a generation is in
//! flight.

use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::engine::Engine;

/// Shared state of the health endpoint
pub struct HealthState {
    pub engine: Option<Arc<Engine>>,
    pub pipelines: Vec<String>,
    pub started: Instant,
}

/// Model labels
#[derive(Debug, Serialize)]
pub struct HealthConfig {
    pub llm: String,
    pub whisper: String,
    pub tts: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub models_loaded: bool,
    pub generating: bool,
    pub uptime_seconds: u64,
    pub pipelines: Vec<String>,
    pub config: HealthConfig,
}

const NOT_LOADED: &str = "not loaded";

async fn health(State(state): State<Arc<HealthState>>) -> Json<HealthResponse> {
    let config = state.engine.as_ref().map_or_else(
        || HealthConfig {
            llm: NOT_LOADED.to_string(),
            whisper: NOT_LOADED.to_string(),
            tts: NOT_LOADED.to_string(),
        },
        |engine| {
            let models = engine.describe();
            HealthConfig {
                llm: models.llm,
                whisper: models.whisper,
                tts: models.tts.unwrap_or_else(|| NOT_LOADED.to_string()),
            }
        },
    );

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        models_loaded: state.engine.is_some(),
        generating: state.engine.as_ref().is_some_and(|e| e.is_generating()),
        uptime_seconds: state.started.elapsed().as_secs(),
        pipelines: state.pipelines.clone(),
        config,
    })
}

/// Build health router
pub fn router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state)
}
