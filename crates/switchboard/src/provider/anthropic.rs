//! Anthropic Messages API client.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::sse::{SseEvent, frame_sse_stream};
use super::{Completion, CompletionRequest, ProviderClient, ProviderFuture, check_status};
use crate::api::streaming::ChunkStream;
use crate::catalog::Provider;
use crate::error::{Error, Result};
use crate::{Message, MessageRole, UsageInfo};

pub const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// The Messages API requires `max_tokens`; used when the request leaves it
/// unset.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

// ── Wire types ─────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
struct MessagesBody<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<&'a Message>,
    temperature: f32,
    stream: bool,
}

impl<'a> MessagesBody<'a> {
    /// System messages go in the top-level `system` field, not the list.
    fn from_request(request: &'a CompletionRequest, stream: bool) -> Self {
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
            .collect();
        Self {
            model: &request.model,
            max_tokens: if request.max_tokens == 0 {
                DEFAULT_MAX_TOKENS
            } else {
                request.max_tokens
            },
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            messages: request
                .messages
                .iter()
                .filter(|m| m.role != MessageRole::System)
                .collect(),
            temperature: request.temperature,
            stream,
        }
    }
}

#[derive(Deserialize, Debug)]
struct RawMessageResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    model: Option<String>,
    stop_reason: Option<String>,
    usage: Option<RawUsage>,
}

#[derive(Deserialize, Debug)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawUsage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

impl From<RawUsage> for UsageInfo {
    fn from(u: RawUsage) -> Self {
        UsageInfo {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: match (u.input_tokens, u.output_tokens) {
                (Some(i), Some(o)) => Some(i + o),
                _ => None,
            },
        }
    }
}

/// One SSE `data:` payload of a streamed message.
#[derive(Deserialize, Debug)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    delta: Option<StreamDelta>,
    error: Option<StreamErrorBody>,
}

#[derive(Deserialize, Debug)]
struct StreamDelta {
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamErrorBody {
    message: String,
}

fn extract_event(payload: &str) -> SseEvent {
    let event: StreamEvent = match serde_json::from_str(payload) {
        Ok(event) => event,
        Err(e) => return SseEvent::Error(format!("unreadable stream event: {e}")),
    };
    match event.event_type.as_str() {
        "content_block_delta" => SseEvent::Text(event.delta.and_then(|d| d.text).unwrap_or_default()),
        "message_stop" => SseEvent::Done,
        "error" => SseEvent::Error(
            event
                .error
                .map_or_else(|| "unknown stream error".to_string(), |e| e.message),
        ),
        other => {
            trace!("Ignoring Anthropic stream event {other}");
            SseEvent::Skip
        }
    }
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the Anthropic Messages API.
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, base_url: Option<&str>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("switchboard/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url
                .unwrap_or(ANTHROPIC_API_BASE)
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn post(&self, body: &MessagesBody<'_>) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
    }

    async fn send_message(&self, request: &CompletionRequest) -> Result<Completion> {
        let body = MessagesBody::from_request(request, false);
        debug!(
            "anthropic request: model={}, messages={}, max_tokens={}",
            request.model,
            body.messages.len(),
            body.max_tokens
        );
        let start = Instant::now();

        let resp = check_status(self.post(&body).send().await?, Provider::Anthropic).await?;
        let text = resp.text().await?;
        debug!(
            "anthropic response in {:.1}s ({} bytes)",
            start.elapsed().as_secs_f64(),
            text.len()
        );

        let parsed: RawMessageResponse = serde_json::from_str(&text)
            .map_err(|e| Error::provider(format!("failed to parse anthropic response: {e}")))?;
        let content = parsed
            .content
            .into_iter()
            .filter(|b| b.block_type == "text")
            .filter_map(|b| b.text)
            .collect::<String>();

        Ok(Completion {
            content,
            model: parsed.model.unwrap_or_else(|| request.model.clone()),
            usage: parsed.usage.map(UsageInfo::from),
            finish_reason: parsed.stop_reason,
        })
    }

    async fn open_stream(&self, request: &CompletionRequest) -> Result<ChunkStream> {
        let body = MessagesBody::from_request(request, true);
        debug!("anthropic streaming request: model={}", request.model);
        let resp = check_status(self.post(&body).send().await?, Provider::Anthropic).await?;
        Ok(frame_sse_stream(resp.bytes_stream(), extract_event))
    }
}

impl ProviderClient for AnthropicClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    fn complete<'a>(&'a self, request: &'a CompletionRequest) -> ProviderFuture<'a, Completion> {
        Box::pin(self.send_message(request))
    }

    fn stream<'a>(&'a self, request: &'a CompletionRequest) -> ProviderFuture<'a, ChunkStream> {
        Box::pin(self.open_stream(request))
    }
}
