//! Robot command pipeline
//!
//! Audio in, command JSON out. The keyword router answers common commands
//! in microseconds; anything it cannot fully resolve goes to the language
//! model in JSON mode.
//!
//! Endpoints:
//! - `POST /robot/command`: audio upload to `{"transcription", "actions", ...}`
//! - `POST /robot/reset`: clear conversation history

use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, routing::post};
use serde_json::{Map, Value, json};

use super::{Pipeline, PipelineContext, millis, request_id, seconds};
use crate::api::{ApiError, AudioUpload};
use crate::router;

const SYSTEM_PROMPT: &str = concat!(
    "<rol>Eres el intérprete de comandos de un robot móvil. Tu ÚNICA función ",
    "es convertir comandos de voz en español a JSON estructurado. NO expliques. ",
    "NO converses. NO saludes. NO añadas texto. Solo JSON. El texto que recibes ",
    "viene de un sistema de reconocimiento de voz y puede contener errores ",
    "ortográficos, palabras cortadas o mal transcritas. Interpreta siempre la ",
    "intención más probable.</rol>",
    "<formato>Responde SIEMPRE con un objeto JSON con esta estructura exacta: ",
    "{\"actions\": [{\"action\": \"TIPO\", \"params\": {...}}]} El array \"actions\" ",
    "contiene una o más acciones en orden de ejecución.</formato>",
    "<acciones>move: direction (forward/backward), distance (metros) | ",
    "turn: direction (left/right), angle (grados) | stop: {} | sleep: {} | ",
    "wake: {} | dance: {} | grab: {} | release: {} | look_up: angle (grados) | ",
    "look_down: angle (grados) | unknown: original (texto del usuario)</acciones>",
    "<defaults>distance=1 metro, angle=90 grados, move direction=forward, ",
    "turn direction=right. Casos especiales: vuelta completa=360, media ",
    "vuelta=180, cuarto de vuelta=90.</defaults>",
    "<variaciones>Ignora vocativos (oye robot) y cortesía (por favor). ",
    "AVANZAR: camina, ve, anda, muévete, adelante. RETROCEDER: atrás, marcha ",
    "atrás. GIRAR: tuerce, rota, dobla, voltea. PARAR: detente, quieto, frena, ",
    "stop, basta, alto. DORMIR: descansa, reposo, duérmete. DESPERTAR: arriba, ",
    "actívate, espabila.</variaciones>",
    "<ejemplos>INPUT: avanza dos metros OUTPUT: {\"actions\":[{\"action\":\"move\",",
    "\"params\":{\"direction\":\"forward\",\"distance\":2}}]} INPUT: gira 45 grados a la ",
    "derecha OUTPUT: {\"actions\":[{\"action\":\"turn\",\"params\":{\"direction\":\"right\",",
    "\"angle\":45}}]} INPUT: para OUTPUT: {\"actions\":[{\"action\":\"stop\",\"params\":{}}]} ",
    "INPUT: avanza un metro y gira a la izquierda OUTPUT: {\"actions\":[{\"action\":",
    "\"move\",\"params\":{\"direction\":\"forward\",\"distance\":1}},{\"action\":\"turn\",",
    "\"params\":{\"direction\":\"left\",\"angle\":90}}]} INPUT: llama a mi madre OUTPUT: ",
    "{\"actions\":[{\"action\":\"unknown\",\"params\":{\"original\":\"llama a mi madre\"}}]}",
    "</ejemplos>",
    "<reglas>1. Responde SOLO con JSON válido. 2. Si no entiendes, usa action ",
    "unknown. 3. Comandos compuestos generan múltiples objetos en el array ",
    "actions. 4. Aplica valores por defecto cuando no se especifiquen.</reglas> ",
    "/no_think"
);

/// Keyword-first robot command pipeline with LLM fallback
pub struct RobotPipeline;

impl Pipeline for RobotPipeline {
    fn name(&self) -> &'static str {
        "robot"
    }

    fn default_system_prompt(&self) -> &'static str {
        SYSTEM_PROMPT
    }

    fn requires_tts(&self) -> bool {
        false
    }

    fn routes(&self, ctx: PipelineContext) -> Router {
        Router::new()
            .route("/robot/command", post(command))
            .route("/robot/reset", post(reset))
            .with_state(Arc::new(ctx))
    }
}

/// Merge a command object into the response body
fn with_command(transcription: &str, command: Value) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("transcription".to_string(), Value::String(transcription.to_string()));
    if let Value::Object(fields) = command {
        body.extend(fields);
    }
    body
}

async fn command(
    State(ctx): State<Arc<PipelineContext>>,
    AudioUpload(audio): AudioUpload,
) -> Result<Json<Value>, ApiError> {
    let request = request_id();
    let started = Instant::now();

    let text = ctx
        .engine
        .transcribe(audio.to_vec())
        .await
        .map_err(ApiError::transcription)?;
    let asr = started.elapsed();
    tracing::info!(pipeline = "robot", request = %request, elapsed_ms = millis(asr), transcript = %text, "transcribed");

    if let Some(routed) = router::route(&text) {
        let routing = started.elapsed().saturating_sub(asr);
        let command = routed.to_command();
        tracing::info!(
            pipeline = "robot",
            request = %request,
            routed_by = "keyword",
            elapsed_us = u64::try_from(routing.as_micros()).unwrap_or(u64::MAX),
            actions = ?routed.actions.iter().map(|a| a.kind.as_str()).collect::<Vec<_>>(),
            "command resolved"
        );

        ctx.conversation.add_exchange(&text, &command.to_string());

        let mut body = with_command(&text, command);
        body.insert("confirmation".to_string(), json!(routed.confirmation));
        body.insert("_routed_by".to_string(), json!("keyword"));
        body.insert(
            "_timing".to_string(),
            json!({
                "asr_seconds": seconds(asr, 2),
                "routing_seconds": seconds(routing, 4),
                "total_seconds": seconds(started.elapsed(), 2),
            }),
        );
        return Ok(Json(Value::Object(body)));
    }

    let messages = ctx.conversation.get_messages(&text);
    let llm_started = Instant::now();
    let raw = ctx
        .engine
        .generate(messages, true)
        .await
        .map_err(ApiError::generation)?;
    let llm = llm_started.elapsed();
    tracing::info!(
        pipeline = "robot",
        request = %request,
        routed_by = "llm",
        elapsed_ms = millis(llm),
        response = %raw.chars().take(120).collect::<String>(),
        "command generated"
    );

    ctx.conversation.add_exchange(&text, &raw);

    let mut body = with_command(&text, router::normalize_llm_command(&raw));
    body.insert("_routed_by".to_string(), json!("llm"));
    body.insert(
        "_timing".to_string(),
        json!({
            "asr_seconds": seconds(asr, 2),
            "llm_seconds": seconds(llm, 2),
            "total_seconds": seconds(started.elapsed(), 2),
        }),
    );
    tracing::info!(pipeline = "robot", request = %request, elapsed_ms = millis(started.elapsed()), "request complete");

    Ok(Json(Value::Object(body)))
}

async fn reset(State(ctx): State<Arc<PipelineContext>>) -> Json<Value> {
    ctx.conversation.clear();
    Json(json!({ "status": "history_cleared", "project": "robot" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_command_merges_fields() {
        let body = with_command("para", json!({"actions": [], "extra": 1}));
        assert_eq!(body["transcription"], json!("para"));
        assert_eq!(body["actions"], json!([]));
        assert_eq!(body["extra"], json!(1));
    }

    #[test]
    fn test_prompt_asks_for_json() {
        assert!(SYSTEM_PROMPT.contains("\"actions\""));
        assert!(SYSTEM_PROMPT.ends_with("/no_think"));
    }

    #[test]
    fn test_prompt_examples_are_valid_commands() {
        assert!(SYSTEM_PROMPT.contains("<variaciones>"));
        assert!(SYSTEM_PROMPT.contains("GIRAR: tuerce, rota, dobla, voltea"));

        let examples = SYSTEM_PROMPT
            .split_once("<ejemplos>")
            .and_then(|(_, rest)| rest.split_once("</ejemplos>"))
            .map(|(block, _)| block)
            .unwrap();
        let counts: Vec<usize> = examples
            .split("OUTPUT: ")
            .skip(1)
            .map(|tail| {
                let json = tail.split(" INPUT:").next().unwrap();
                let command: Value = serde_json::from_str(json.trim()).unwrap();
                command["actions"].as_array().unwrap().len()
            })
            .collect();
        assert_eq!(counts, vec![1, 1, 1, 2, 1]);
    }
}
