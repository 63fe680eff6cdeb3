//! HTTP API server for the Vox gateway

pub mod error;
pub mod health;
mod upload;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use upload::AudioUpload;

use crate::engine::Engine;
use crate::history::ConversationLog;
use crate::pipelines::{Pipeline, PipelineContext};
use crate::{Error, Result};

/// Largest accepted audio upload (about ten minutes of 16 kHz mono WAV)
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Configuration for building an API server
pub struct ApiServerBuilder {
    host: String,
    port: u16,
    engine: Option<Arc<Engine>>,
    pipelines: Vec<(Box<dyn Pipeline>, Arc<ConversationLog>)>,
}

impl ApiServerBuilder {
    /// Create a new API server builder
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            engine: None,
            pipelines: Vec::new(),
        }
    }

    /// Set the shared model engine
    #[must_use]
    pub fn engine(mut self, engine: Arc<Engine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Mount a pipeline with its conversation log
    #[must_use]
    pub fn pipeline(mut self, pipeline: Box<dyn Pipeline>, conversation: Arc<ConversationLog>) -> Self {
        self.pipelines.push((pipeline, conversation));
        self
    }

    /// Build the API server
    ///
    /// # Errors
    ///
    /// Returns error if pipelines were added without an engine, or a
    /// pipeline needs a synthesizer the engine does not have
    pub fn build(self) -> Result<ApiServer> {
        if !self.pipelines.is_empty() {
            let engine = self
                .engine
                .as_ref()
                .ok_or_else(|| Error::Config("pipelines need a model engine".to_string()))?;

            if let Some((pipeline, _)) = self
                .pipelines
                .iter()
                .find(|(p, _)| p.requires_tts() && !engine.has_tts())
            {
                return Err(Error::Config(format!(
                    "pipeline '{}' needs text-to-speech",
                    pipeline.name()
                )));
            }
        }

        Ok(ApiServer {
            host: self.host,
            port: self.port,
            engine: self.engine,
            pipelines: self.pipelines,
            started: Instant::now(),
        })
    }
}

/// API server
pub struct ApiServer {
    host: String,
    port: u16,
    engine: Option<Arc<Engine>>,
    pipelines: Vec<(Box<dyn Pipeline>, Arc<ConversationLog>)>,
    started: Instant,
}

impl ApiServer {
    /// Names of the mounted pipelines
    #[must_use]
    pub fn pipeline_names(&self) -> Vec<String> {
        self.pipelines
            .iter()
            .map(|(p, _)| p.name().to_string())
            .collect()
    }

    /// Build the router with all routes
    #[must_use]
    pub fn router(&self) -> Router {
        let health_state = Arc::new(health::HealthState {
            engine: self.engine.clone(),
            pipelines: self.pipeline_names(),
            started: self.started,
        });
        let mut router = Router::new().merge(health::router(health_state));

        if let Some(engine) = &self.engine {
            for (pipeline, conversation) in &self.pipelines {
                router = router.merge(pipeline.routes(PipelineContext {
                    engine: Arc::clone(engine),
                    conversation: Arc::clone(conversation),
                }));
            }
        }

        // CORS layer for browser clients
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        router
            .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server until `shutdown` resolves
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind API server on {addr}: {e}")))?;

        let pipelines = self.pipeline_names();
        tracing::info!(
            addr = %addr,
            pipelines = ?if pipelines.is_empty() { vec!["none".to_string()] } else { pipelines },
            "API server listening"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run(std::future::pending()).await })
    }
}
