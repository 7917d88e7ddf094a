//! Text generation over an OpenAI-compatible chat completions API.
//!
//! Groq and OpenAI expose the same `POST {base_url}/chat/completions`
//! contract, so one [`ChatCompletionsGenerator`] serves both providers.
//! Streaming answers arrive as server-sent events; [`SseDecoder`] turns the
//! raw byte stream into content fragments.
//!
//! The request timeout covers the whole exchange, including reading a
//! streamed body.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tracing::debug;

use rag_chat_core::generation::{Generator, TokenStream};

use crate::config::LlmConfig;

/// Build the generator named by `config.provider`, reading its API key
/// from the environment.
pub fn create_generator(config: &LlmConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "groq" | "openai" => Ok(Arc::new(ChatCompletionsGenerator::new(
            config,
            config.api_key()?,
        )?)),
        other => bail!("Unknown LLM provider: {}", other),
    }
}

/// Generator backed by an OpenAI-compatible chat completions endpoint.
pub struct ChatCompletionsGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl ChatCompletionsGenerator {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    async fn send(&self, prompt: &str, stream: bool) -> Result<reqwest::Response> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            stream,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("LLM request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("LLM API error {}: {}", status, body_text);
        }
        Ok(response)
    }
}

#[async_trait]
impl Generator for ChatCompletionsGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let response = self.send(prompt, false).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse LLM response: {}", e))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("LLM response contained no message content"))
    }

    async fn stream(&self, prompt: &str) -> Result<TokenStream> {
        let response = self.send(prompt, true).await?;
        debug!(model = %self.model, "token stream opened");
        Ok(sse_tokens(response.bytes_stream()))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Deserialize, Default)]
struct Delta {
    content: Option<String>,
}

/// One decoded server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Token(String),
    Done,
}

/// Incremental decoder for chat-completion SSE bodies.
///
/// Bytes are buffered until a full line is available, so events and UTF-8
/// sequences split across network reads decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning every event completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<SseEvent>> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = decode_line(&line)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Decode whatever is left once the body has ended.
    pub fn finish(&mut self) -> Result<Vec<SseEvent>> {
        let rest = std::mem::take(&mut self.buffer);
        Ok(decode_line(&rest)?.into_iter().collect())
    }
}

fn decode_line(raw: &[u8]) -> Result<Option<SseEvent>> {
    let line = std::str::from_utf8(raw)
        .map_err(|e| anyhow::anyhow!("LLM stream is not valid UTF-8: {}", e))?
        .trim_end_matches(['\r', '\n']);

    let Some(payload) = line.strip_prefix("data:") else {
        // Blank separators, comments, and `event:`/`id:` fields carry no content.
        return Ok(None);
    };
    let payload = payload.trim();
    if payload.is_empty() {
        return Ok(None);
    }
    if payload == "[DONE]" {
        return Ok(Some(SseEvent::Done));
    }

    let value: serde_json::Value = serde_json::from_str(payload)
        .map_err(|e| anyhow::anyhow!("Malformed LLM stream event: {}", e))?;
    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        bail!("LLM stream error: {}", message);
    }

    let chunk: StreamChunk = serde_json::from_value(value)
        .map_err(|e| anyhow::anyhow!("Malformed LLM stream event: {}", e))?;
    let content = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.content)
        .collect::<String>();
    Ok(Some(SseEvent::Token(content)))
}

struct SseState {
    body: stream::BoxStream<'static, Result<Vec<u8>, String>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    done: bool,
}

impl SseState {
    fn absorb(&mut self, events: Vec<SseEvent>) {
        for event in events {
            match event {
                SseEvent::Token(t) => self.pending.push_back(t),
                SseEvent::Done => {
                    self.done = true;
                    break;
                }
            }
        }
    }
}

/// Adapt an SSE byte stream into a [`TokenStream`].
///
/// The token stream ends at `[DONE]` or end of body, and ends with a single
/// `Err` if the body fails or carries an error event. Dropping it drops the
/// body, closing the connection.
pub fn sse_tokens<S, B, E>(body: S) -> TokenStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + 'static,
    E: std::fmt::Display + 'static,
{
    let body = body
        .map(|item| item.map(|b| b.as_ref().to_vec()).map_err(|e| e.to_string()))
        .boxed();
    let state = SseState {
        body,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(token) = st.pending.pop_front() {
                return Some((Ok(token), st));
            }
            if st.done {
                return None;
            }
            let decoded = match st.body.next().await {
                Some(Ok(bytes)) => st.decoder.push(&bytes),
                Some(Err(e)) => Err(anyhow::anyhow!("LLM stream interrupted: {}", e)),
                None => {
                    st.done = true;
                    st.decoder.finish()
                }
            };
            match decoded {
                Ok(events) => st.absorb(events),
                Err(e) => {
                    st.done = true;
                    st.pending.clear();
                    return Some((Err(e), st));
                }
            }
        }
    })
    .boxed()
}
