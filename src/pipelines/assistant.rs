//! Conversational voice assistant
//!
//! Endpoints:
//! - `POST /assistant/chat`: audio upload to one WAV reply
//! - `POST /assistant/chat/stream`: audio upload to length-prefixed WAV chunks
//! - `POST /assistant/chat/text`: audio upload to a JSON text reply
//! - `POST /assistant/reset`: clear conversation history

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, header},
    response::{IntoResponse, Response},
    routing::post,
};
use futures::StreamExt;
use serde_json::{Value, json};
use tokio_stream::wrappers::ReceiverStream;

use super::{Pipeline, PipelineContext, millis, request_id, seconds};
use crate::api::{ApiError, AudioUpload};
use crate::engine::ChunkedReply;

const SYSTEM_PROMPT: &str = concat!(
    "Eres un asistente de voz amigable que habla español. Responde de forma ",
    "breve y clara, en 1-2 oraciones como máximo. Sé conversacional y útil. ",
    "No uses emojis, markdown, listas, ni formato especial. /no_think"
);

/// Longest reply text echoed in a response header
const MAX_HEADER_CHARS: usize = 500;

/// Conversational voice assistant with sentence-streamed speech
pub struct AssistantPipeline;

impl Pipeline for AssistantPipeline {
    fn name(&self) -> &'static str {
        "assistant"
    }

    fn default_system_prompt(&self) -> &'static str {
        SYSTEM_PROMPT
    }

    fn requires_tts(&self) -> bool {
        true
    }

    fn routes(&self, ctx: PipelineContext) -> Router {
        Router::new()
            .route("/assistant/chat", post(chat))
            .route("/assistant/chat/stream", post(chat_stream))
            .route("/assistant/chat/text", post(chat_text))
            .route("/assistant/reset", post(reset))
            .with_state(Arc::new(ctx))
    }
}

/// Header value carrying free text
///
/// Control characters become spaces and the text is capped; non-ASCII bytes
/// are passed through as UTF-8.
fn text_header(text: &str) -> HeaderValue {
    let cleaned: String = text
        .chars()
        .take(MAX_HEADER_CHARS)
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    HeaderValue::from_bytes(cleaned.as_bytes()).unwrap_or_else(|_| HeaderValue::from_static(""))
}

fn timing_header(value: f64) -> HeaderValue {
    HeaderValue::from_str(&value.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0"))
}

async fn chat(
    State(ctx): State<Arc<PipelineContext>>,
    AudioUpload(audio): AudioUpload,
) -> Result<Response, ApiError> {
    let request = request_id();
    let started = Instant::now();

    let text = ctx
        .engine
        .transcribe(audio.to_vec())
        .await
        .map_err(ApiError::transcription)?;
    let asr = started.elapsed();
    tracing::info!(pipeline = "assistant", request = %request, elapsed_ms = millis(asr), transcript = %text, "transcribed");

    let messages = ctx.conversation.get_messages(&text);
    let speak_started = Instant::now();
    let reply = ctx
        .engine
        .speak(messages)
        .await
        .map_err(ApiError::generation)?;
    let speak = speak_started.elapsed();
    tracing::info!(
        pipeline = "assistant",
        request = %request,
        elapsed_ms = millis(speak),
        sentences = reply.sentences,
        response = %reply.text.chars().take(120).collect::<String>(),
        "reply synthesized"
    );

    ctx.conversation.add_exchange(&text, &reply.text);

    let total = started.elapsed();
    tracing::info!(pipeline = "assistant", request = %request, elapsed_ms = millis(total), "request complete");

    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static("audio/wav")),
        (HeaderName::from_static("x-transcription"), text_header(&text)),
        (HeaderName::from_static("x-response-text"), text_header(&reply.text)),
        (HeaderName::from_static("x-timing-asr"), timing_header(seconds(asr, 2))),
        (HeaderName::from_static("x-timing-llm-tts"), timing_header(seconds(speak, 2))),
        (HeaderName::from_static("x-timing-total"), timing_header(seconds(total, 2))),
    ];
    Ok((headers, reply.audio).into_response())
}

async fn chat_stream(
    State(ctx): State<Arc<PipelineContext>>,
    AudioUpload(audio): AudioUpload,
) -> Result<Response, ApiError> {
    let request = request_id();
    let started = Instant::now();

    let text = ctx
        .engine
        .transcribe(audio.to_vec())
        .await
        .map_err(ApiError::transcription)?;
    tracing::info!(pipeline = "assistant", request = %request, elapsed_ms = millis(started.elapsed()), transcript = %text, "transcribed");

    let messages = ctx.conversation.get_messages(&text);
    let ChunkedReply { frames, reply } = ctx
        .engine
        .speak_chunked(messages)
        .await
        .map_err(ApiError::generation)?;

    // Record the exchange once generation completes, even if the client left
    let conversation = Arc::clone(&ctx.conversation);
    let user_text = text.clone();
    tokio::spawn(async move {
        match reply.await {
            Ok(Ok(reply)) => {
                tracing::info!(
                    pipeline = "assistant",
                    request = %request,
                    elapsed_ms = millis(started.elapsed()),
                    response = %reply.chars().take(120).collect::<String>(),
                    "stream complete"
                );
                conversation.add_exchange(&user_text, &reply);
            }
            Ok(Err(e)) => {
                tracing::error!(pipeline = "assistant", request = %request, error = %e, "stream aborted");
            }
            Err(e) => {
                tracing::error!(pipeline = "assistant", request = %request, error = %e, "stream worker failed");
            }
        }
    });

    let body = Body::from_stream(ReceiverStream::new(frames).map(Ok::<_, Infallible>));
    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
        (HeaderName::from_static("x-transcription"), text_header(&text)),
    ];
    Ok((headers, body).into_response())
}

async fn chat_text(
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

    let messages = ctx.conversation.get_messages(&text);
    let reply = ctx
        .engine
        .generate(messages, false)
        .await
        .map_err(ApiError::generation)?;
    tracing::info!(pipeline = "assistant", request = %request, elapsed_ms = millis(started.elapsed()), transcript = %text, "text reply generated");

    ctx.conversation.add_exchange(&text, &reply);

    Ok(Json(json!({ "transcription": text, "response": reply })))
}

async fn reset(State(ctx): State<Arc<PipelineContext>>) -> Json<Value> {
    ctx.conversation.clear();
    Json(json!({ "status": "history_cleared", "project": "assistant" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_header_keeps_accents() {
        let value = text_header("¿Qué tal?\nBien");
        assert_eq!(value.as_bytes(), "¿Qué tal? Bien".as_bytes());
    }

    #[test]
    fn test_text_header_is_capped() {
        let long = "a".repeat(MAX_HEADER_CHARS + 50);
        assert_eq!(text_header(&long).len(), MAX_HEADER_CHARS);
    }
}
