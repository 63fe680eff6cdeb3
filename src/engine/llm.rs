//! OpenAI-compatible chat completion client (llama.cpp server and friends)

use std::collections::VecDeque;
use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::runtime::Handle;

use super::{ChatMessage, LanguageModel, TokenStream};
use crate::config::LlmConfig;
use crate::{Error, Result};

/// Sampling settings tuned for small instruction models
const TOP_P: f32 = 0.8;
const TOP_K: u32 = 20;
const PRESENCE_PENALTY: f32 = 1.5;

#[derive(Deserialize)]
struct Completion {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Chat model served over HTTP
///
/// Calls are made from blocking worker threads and driven on the runtime
/// through `handle`.
pub struct ChatServerLlm {
    client: reqwest::Client,
    handle: Handle,
    endpoint: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl ChatServerLlm {
    /// Create a client for the server at `config.url`
    ///
    /// # Errors
    ///
    /// Returns error if called outside a Tokio runtime
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| Error::Config(format!("LLM client needs a runtime: {e}")))?;

        Ok(Self {
            client: reqwest::Client::new(),
            handle,
            endpoint: format!("{}/v1/chat/completions", config.url.trim_end_matches('/')),
            model: config.model_name(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    fn request_body(&self, messages: &[ChatMessage], json_mode: bool, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "top_p": TOP_P,
            "top_k": TOP_K,
            "presence_penalty": PRESENCE_PENALTY,
            "stream": stream,
        });
        if json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        body
    }

    async fn post(&self, body: serde_json::Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "LLM request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "LLM server error");
            return Err(Error::Llm(format!("server error {status}: {body}")));
        }

        Ok(response)
    }
}

impl LanguageModel for ChatServerLlm {
    fn generate(&self, messages: &[ChatMessage], json_mode: bool) -> Result<String> {
        let body = self.request_body(messages, json_mode, false);

        self.handle.block_on(async {
            let completion: Completion = self.post(body).await?.json().await?;
            let content = completion
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .unwrap_or_default();

            tracing::debug!(chars = content.len(), json_mode, "completion received");
            Ok(content)
        })
    }

    fn generate_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream> {
        let body = self.request_body(messages, false, true);
        let response = self.handle.block_on(self.post(body))?;

        Ok(Box::new(SseTokens {
            handle: self.handle.clone(),
            body: Box::pin(response.bytes_stream()),
            line: Vec::new(),
            pending: VecDeque::new(),
            finished: false,
        }))
    }

    fn describe(&self) -> String {
        self.model.clone()
    }
}

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Pull iterator over the `data:` events of a streaming completion
struct SseTokens {
    handle: Handle,
    body: ByteStream,
    /// Bytes of an incomplete line; may end mid UTF-8 sequence
    line: Vec<u8>,
    pending: VecDeque<String>,
    finished: bool,
}

impl SseTokens {
    fn absorb(&mut self, chunk: &[u8]) {
        self.line.extend_from_slice(chunk);

        while let Some(pos) = self.line.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.line.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            self.parse_event(line.trim());
            if self.finished {
                break;
            }
        }
    }

    fn parse_event(&mut self, line: &str) {
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim();
        if data == "[DONE]" {
            self.finished = true;
            return;
        }

        match serde_json::from_str::<StreamChunk>(data) {
            Ok(chunk) => {
                let token = chunk
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.delta.content)
                    .unwrap_or_default();
                if !token.is_empty() {
                    self.pending.push_back(token);
                }
            }
            Err(e) => tracing::debug!(error = %e, data, "skipping unparseable stream event"),
        }
    }
}

impl Iterator for SseTokens {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Some(Ok(token));
            }
            if self.finished {
                return None;
            }

            match self.handle.block_on(self.body.next()) {
                Some(Ok(chunk)) => self.absorb(&chunk),
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(Error::Llm(format!("stream interrupted: {e}"))));
                }
                None => {
                    self.finished = true;
                    let rest = std::mem::take(&mut self.line);
                    self.parse_event(String::from_utf8_lossy(&rest).trim());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> SseTokens {
        SseTokens {
            handle: tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap()
                .handle()
                .clone(),
            body: Box::pin(futures::stream::empty()),
            line: Vec::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    #[test]
    fn test_parses_split_events() {
        let mut sse = tokens();
        sse.absorb(b"data: {\"choices\":[{\"delta\":{\"content\":\"Ho\"}}]}\n\ndata: {\"choi");
        sse.absorb(b"ces\":[{\"delta\":{\"content\":\"la\"}}]}\n\n");
        assert_eq!(sse.pending, VecDeque::from(["Ho".to_string(), "la".to_string()]));
    }

    #[test]
    fn test_multibyte_split_across_chunks() {
        let mut sse = tokens();
        let event = "data: {\"choices\":[{\"delta\":{\"content\":\"día\"}}]}\n".as_bytes();
        let split = event.iter().position(|&b| b == 0xC3).unwrap() + 1;
        sse.absorb(&event[..split]);
        sse.absorb(&event[split..]);
        assert_eq!(sse.pending, VecDeque::from(["día".to_string()]));
    }

    #[test]
    fn test_done_marker_finishes() {
        let mut sse = tokens();
        sse.absorb(b"data: [DONE]\n\n");
        assert!(sse.finished);
        assert!(sse.next().is_none());
    }

    #[test]
    fn test_role_only_delta_is_skipped() {
        let mut sse = tokens();
        sse.absorb(b"data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n");
        sse.absorb(b": keep-alive\n");
        assert!(sse.pending.is_empty());
    }
}
