//! Voice pipelines
//!
//! A pipeline is a named HTTP surface (robot commands, voice assistant) that
//! shares the [`Engine`] with every other active pipeline and owns its own
//! conversation log. Pipelines are looked up by name in a static registry.

pub mod assistant;
pub mod robot;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;

use crate::engine::Engine;
use crate::history::ConversationLog;
use crate::{Error, Result};

/// Everything a pipeline's handlers need
pub struct PipelineContext {
    pub engine: Arc<Engine>,
    pub conversation: Arc<ConversationLog>,
}

/// A named HTTP surface over the shared engine
pub trait Pipeline: Send + Sync {
    /// Registry name and conversation key
    fn name(&self) -> &'static str;

    /// Prompt used unless configuration overrides it
    fn default_system_prompt(&self) -> &'static str;

    /// Whether the pipeline needs a synthesizer
    fn requires_tts(&self) -> bool;

    /// Routes served by this pipeline, with absolute paths
    fn routes(&self, ctx: PipelineContext) -> Router;
}

type Factory = fn() -> Box<dyn Pipeline>;

fn robot() -> Box<dyn Pipeline> {
    Box::new(robot::RobotPipeline)
}

fn assistant() -> Box<dyn Pipeline> {
    Box::new(assistant::AssistantPipeline)
}

/// Every pipeline the gateway knows how to serve
const REGISTRY: &[(&str, Factory)] = &[("robot", robot), ("assistant", assistant)];

/// Names of the registered pipelines
pub fn available() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|(name, _)| *name)
}

/// Instantiate a pipeline by name
///
/// # Errors
///
/// Returns error if no pipeline is registered under `name`
pub fn create(name: &str) -> Result<Box<dyn Pipeline>> {
    REGISTRY
        .iter()
        .find(|(registered, _)| *registered == name)
        .map(|(_, factory)| factory())
        .ok_or_else(|| Error::UnknownPipeline(name.to_string()))
}

/// Instantiate the configured pipelines, skipping unknown names and repeats
pub fn resolve(names: &[String]) -> Vec<Box<dyn Pipeline>> {
    let mut pipelines: Vec<Box<dyn Pipeline>> = Vec::with_capacity(names.len());

    for name in names {
        if pipelines.iter().any(|p| p.name() == name.as_str()) {
            tracing::warn!(pipeline = %name, "pipeline listed twice, ignoring repeat");
            continue;
        }
        match create(name) {
            Ok(pipeline) => pipelines.push(pipeline),
            Err(e) => tracing::error!(
                error = %e,
                available = ?available().collect::<Vec<_>>(),
                "skipping pipeline"
            ),
        }
    }

    pipelines
}

/// Seconds rounded to `places` decimals, for `_timing` fields
pub(crate) fn seconds(elapsed: Duration, places: i32) -> f64 {
    let scale = 10_f64.powi(places);
    (elapsed.as_secs_f64() * scale).round() / scale
}

/// Whole milliseconds, for log fields
pub(crate) fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Short id attached to every log line of one request
pub(crate) fn request_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_names() {
        assert_eq!(available().collect::<Vec<_>>(), vec!["robot", "assistant"]);
        assert_eq!(create("robot").unwrap().name(), "robot");
        assert!(create("assistant").unwrap().requires_tts());
        assert!(!create("robot").unwrap().requires_tts());
    }

    #[test]
    fn test_unknown_pipeline() {
        assert!(matches!(create("kitchen"), Err(Error::UnknownPipeline(_))));
    }

    #[test]
    fn test_resolve_skips_unknown_and_repeats() {
        let names = ["robot", "kitchen", "assistant", "robot"].map(String::from);
        let resolved = resolve(&names);
        let names: Vec<_> = resolved.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["robot", "assistant"]);
    }

    #[test]
    fn test_seconds_rounding() {
        assert!((seconds(Duration::from_millis(1234), 2) - 1.23).abs() < f64::EPSILON);
        assert!((seconds(Duration::from_micros(1500), 4) - 0.0015).abs() < f64::EPSILON);
    }
}
