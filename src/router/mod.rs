//! Keyword intent router
//!
//! Resolves common robot commands by pattern matching, without touching the
//! language model. Output has the same shape as the LLM fallback so the
//! robot always receives `{"actions": [{"action": ..., "params": {...}}]}`.
//!
//! ```text
//! raw text ─▶ strip noise ─▶ normalize numbers ─▶ split compound
//!                                                     │
//!                               ┌─────────────────────┘
//!                               ▼
//!                  resolve each fragment (pattern table)
//!                               │
//!              all resolved ─▶ RouteResult     any miss ─▶ None (LLM)
//! ```

pub mod numbers;
mod patterns;

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Serialize, Serializer};
use serde_json::{Value, json};

/// Vocatives and courtesy phrases ASR picks up around a command
static NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:oye|eh|hey|robot|por favor|porfa|venga|puedes)\b").expect("valid regex")
});

/// Connectives that chain sequential sub-commands
static COMPOUND_SPLITTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\s*,\s*(?:y\s+)?(?:(?:luego|despu[eé]s)\s+)?|\s*[.;]\s+|\s+y\s+(?:(?:luego|despu[eé]s)\s+)?|\s+(?:luego|despu[eé]s)\s+",
    )
    .expect("valid regex")
});

/// Kind of robot action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Move,
    Turn,
    Stop,
    Sleep,
    Wake,
    Dance,
    Grab,
    Release,
    LookUp,
    LookDown,
    Unknown,
    Error,
}

impl ActionKind {
    /// Wire name of the action
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::Turn => "turn",
            Self::Stop => "stop",
            Self::Sleep => "sleep",
            Self::Wake => "wake",
            Self::Dance => "dance",
            Self::Grab => "grab",
            Self::Release => "release",
            Self::LookUp => "look_up",
            Self::LookDown => "look_down",
            Self::Unknown => "unknown",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single action parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

impl ParamValue {
    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Number(_) => None,
            Self::Text(t) => Some(t),
        }
    }
}

impl Serialize for ParamValue {
    // Whole numbers go out as JSON integers ("distance": 2, not 2.0)
    #[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                serializer.serialize_i64(*n as i64)
            }
            Self::Number(n) => serializer.serialize_f64(*n),
            Self::Text(t) => serializer.serialize_str(t),
        }
    }
}

/// One structured robot action
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Action {
    #[serde(rename = "action")]
    pub kind: ActionKind,
    pub params: BTreeMap<String, ParamValue>,
}

impl Action {
    /// Action with no parameters
    #[must_use]
    pub const fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            params: BTreeMap::new(),
        }
    }

    /// Wrap unparseable model output so the wire contract still holds
    #[must_use]
    pub fn error(raw: &str) -> Self {
        let mut action = Self::new(ActionKind::Error);
        action
            .params
            .insert("raw".to_string(), ParamValue::Text(raw.to_string()));
        action
    }

    /// Numeric parameter, if present
    #[must_use]
    pub fn number(&self, key: &str) -> Option<f64> {
        self.params.get(key).and_then(ParamValue::as_f64)
    }

    /// Text parameter, if present
    #[must_use]
    pub fn text(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(ParamValue::as_str)
    }
}

/// Fully resolved utterance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteResult {
    pub actions: Vec<Action>,
    pub confirmation: String,
}

impl RouteResult {
    /// Command JSON in the shape shared with the LLM fallback
    #[must_use]
    pub fn to_command(&self) -> Value {
        json!({ "actions": self.actions })
    }
}

/// Route raw ASR text to actions
///
/// Returns `None` when any part of the utterance is outside the command
/// vocabulary; the caller then hands the whole utterance to the LLM. A
/// compound command is never partially resolved.
#[must_use]
pub fn route(text: &str) -> Option<RouteResult> {
    let cleaned = strip_noise(text);
    if cleaned.is_empty() {
        return None;
    }

    let normalized = numbers::normalize(&cleaned);
    let fragments = split_compound(&normalized);

    let mut actions = Vec::with_capacity(fragments.len());
    let mut confirmations = Vec::with_capacity(fragments.len());
    for fragment in &fragments {
        let Some((action, confirmation)) = patterns::resolve(fragment) else {
            tracing::debug!(fragment, "fragment unresolved, deferring to LLM");
            return None;
        };
        actions.push(action);
        confirmations.push(confirmation);
    }

    if actions.is_empty() {
        return None;
    }

    Some(RouteResult {
        actions,
        confirmation: confirmations.join(". "),
    })
}

/// Remove vocatives, courtesy phrases and stray punctuation
fn strip_noise(text: &str) -> String {
    let lowered = text.to_lowercase();
    let without_noise = NOISE.replace_all(&lowered, " ");
    let without_marks: String = without_noise
        .chars()
        .filter(|c| !matches!(c, '¿' | '?' | '¡' | '!'))
        .collect();

    without_marks
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| matches!(c, '.' | ',' | ';' | ':') || c.is_whitespace())
        .to_string()
}

/// Split on connectives; empty fragments are dropped
fn split_compound(text: &str) -> Vec<&str> {
    COMPOUND_SPLITTER
        .split(text)
        .map(|part| part.trim_matches(|c: char| matches!(c, '.' | ',' | ';') || c.is_whitespace()))
        .filter(|part| !part.is_empty())
        .collect()
}

/// Coerce one-shot LLM output into the command JSON contract
///
/// A JSON object with an `actions` array passes through, an object without
/// one becomes a one-element list, a bare array is taken as the list, and
/// anything else becomes a single `error` action carrying the raw text.
#[must_use]
pub fn normalize_llm_command(raw: &str) -> Value {
    let body = strip_code_fence(raw);
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => match map.get("actions") {
            Some(Value::Array(_)) => Value::Object(map),
            None => json!({ "actions": [Value::Object(map)] }),
            Some(_) => json!({ "actions": [Action::error(raw)] }),
        },
        Ok(Value::Array(items)) => json!({ "actions": items }),
        Ok(_) | Err(_) => {
            tracing::warn!(raw, "LLM returned non-command output");
            json!({ "actions": [Action::error(raw)] })
        }
    }
}

/// Drop a surrounding ```json fence if the model added one
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map_or(trimmed, str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_noise() {
        assert_eq!(strip_noise("Oye robot, por favor avanza."), "avanza");
        assert_eq!(strip_noise("¿Puedes girar?"), "girar");
        assert_eq!(strip_noise("oye robot"), "");
    }

    #[test]
    fn test_split_compound() {
        assert_eq!(
            split_compound("avanza dos metros y gira a la derecha"),
            vec!["avanza dos metros", "gira a la derecha"]
        );
        assert_eq!(
            split_compound("avanza, gira a la derecha y luego baila"),
            vec!["avanza", "gira a la derecha", "baila"]
        );
        assert_eq!(
            split_compound("avanza después gira"),
            vec!["avanza", "gira"]
        );
        assert_eq!(split_compound("avanza 2.5 metros"), vec!["avanza 2.5 metros"]);
    }

    #[test]
    fn test_param_value_serialization() {
        let mut action = Action::new(ActionKind::Move);
        action
            .params
            .insert("distance".to_string(), ParamValue::Number(2.0));
        action
            .params
            .insert("direction".to_string(), ParamValue::Text("forward".to_string()));
        let json = serde_json::to_string(&action).unwrap();
        assert_eq!(
            json,
            r#"{"action":"move","params":{"direction":"forward","distance":2}}"#
        );

        let half = serde_json::to_value(ParamValue::Number(0.5)).unwrap();
        assert_eq!(half, json!(0.5));
    }

    #[test]
    fn test_action_kind_wire_names() {
        assert_eq!(
            serde_json::to_value(ActionKind::LookUp).unwrap(),
            json!("look_up")
        );
        assert_eq!(ActionKind::LookDown.to_string(), "look_down");
    }

    #[test]
    fn test_normalize_llm_command_passthrough() {
        let raw = r#"{"actions":[{"action":"dance","params":{}}]}"#;
        assert_eq!(
            normalize_llm_command(raw),
            json!({"actions": [{"action": "dance", "params": {}}]})
        );
    }

    #[test]
    fn test_normalize_llm_command_wraps_single_action() {
        let raw = r#"{"action":"unknown","params":{"original":"llama a mi madre"}}"#;
        assert_eq!(
            normalize_llm_command(raw),
            json!({"actions": [{"action": "unknown", "params": {"original": "llama a mi madre"}}]})
        );
    }

    #[test]
    fn test_normalize_llm_command_fenced() {
        let raw = "```json\n{\"actions\":[{\"action\":\"stop\",\"params\":{}}]}\n```";
        assert_eq!(
            normalize_llm_command(raw),
            json!({"actions": [{"action": "stop", "params": {}}]})
        );
    }

    #[test]
    fn test_normalize_llm_command_garbage() {
        let command = normalize_llm_command("lo siento, no entiendo");
        assert_eq!(
            command,
            json!({"actions": [{"action": "error", "params": {"raw": "lo siento, no entiendo"}}]})
        );
    }
}
