//! OpenAI-compatible chat completions client.
//!
//! OpenAI, DeepSeek, and OpenRouter all expose the same
//! `/chat/completions` shape, differing only in base URL and a couple of
//! optional headers, so one client serves all three.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::sse::{SseEvent, frame_sse_stream};
use super::{Completion, CompletionRequest, ProviderClient, ProviderFuture, check_status};
use crate::api::streaming::ChunkStream;
use crate::catalog::Provider;
use crate::error::{Error, Result};
use crate::{Message, UsageInfo};

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEEPSEEK_API_BASE: &str = "https://api.deepseek.com/v1";
pub const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";

/// Default base URL for an OpenAI-compatible provider.
pub fn default_base_url(provider: Provider) -> &'static str {
    match provider {
        Provider::DeepSeek => DEEPSEEK_API_BASE,
        Provider::OpenRouter => OPENROUTER_API_BASE,
        _ => OPENAI_API_BASE,
    }
}

// ── Wire types ─────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "is_zero_u32")]
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    #[serde(default)]
    choices: Vec<RawChoice>,
    error: Option<ApiErrorResponse>,
    model: Option<String>,
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// One SSE `data:` payload of a streamed completion.
#[derive(Deserialize, Debug)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<ApiErrorResponse>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamDelta {
    content: Option<String>,
}

/// Map one SSE payload to the text it carries.
fn extract_event(payload: &str) -> SseEvent {
    match serde_json::from_str::<StreamChunk>(payload) {
        Ok(chunk) => {
            if let Some(err) = chunk.error {
                return SseEvent::Error(err.message);
            }
            let mut text = String::new();
            for choice in chunk.choices {
                if let Some(content) = choice.delta.and_then(|d| d.content) {
                    text.push_str(&content);
                }
                if choice.finish_reason.is_some() {
                    trace!("Stream finish_reason: {:?}", choice.finish_reason);
                }
            }
            SseEvent::Text(text)
        }
        Err(e) => SseEvent::Error(format!("unreadable stream chunk: {e}")),
    }
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for an OpenAI-compatible chat completions API.
pub struct OpenAiCompatibleClient {
    provider: Provider,
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiCompatibleClient {
    pub fn new(
        provider: Provider,
        api_key: impl Into<String>,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("switchboard/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            provider,
            client,
            api_key: api_key.into(),
            base_url: base_url
                .unwrap_or(default_base_url(provider))
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn post(&self, body: &ChatBody<'_>) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body);
        if self.provider == Provider::OpenRouter {
            request = request
                .header("HTTP-Referer", "https://github.com/switchboard-rs/switchboard")
                .header("X-Title", "switchboard");
        }
        request
    }

    async fn chat(&self, request: &CompletionRequest) -> Result<Completion> {
        let body = ChatBody {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
        };
        debug!(
            "{} request: model={}, messages={}, max_tokens={}, temp={}",
            self.provider,
            request.model,
            request.messages.len(),
            request.max_tokens,
            request.temperature,
        );
        let start = Instant::now();

        let resp = check_status(self.post(&body).send().await?, self.provider).await?;
        let text = resp.text().await?;
        debug!(
            "{} response in {:.1}s ({} bytes)",
            self.provider,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        let parsed: RawChatResponse = serde_json::from_str(&text)
            .map_err(|e| Error::provider(format!("failed to parse {} response: {e}", self.provider)))?;
        if let Some(err) = parsed.error {
            return Err(Error::provider(format!("{} API error: {}", self.provider, err.message)));
        }

        let choice = parsed.choices.into_iter().next();
        Ok(Completion {
            content: choice
                .as_ref()
                .and_then(|c| c.message.content.clone())
                .unwrap_or_default(),
            model: parsed.model.unwrap_or_else(|| request.model.clone()),
            usage: parsed.usage,
            finish_reason: choice.and_then(|c| c.finish_reason),
        })
    }

    async fn open_stream(&self, request: &CompletionRequest) -> Result<ChunkStream> {
        let body = ChatBody {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: true,
        };
        debug!(
            "{} streaming request: model={}, messages={}",
            self.provider,
            request.model,
            request.messages.len()
        );
        let resp = check_status(self.post(&body).send().await?, self.provider).await?;
        Ok(frame_sse_stream(resp.bytes_stream(), extract_event))
    }
}

impl ProviderClient for OpenAiCompatibleClient {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn complete<'a>(&'a self, request: &'a CompletionRequest) -> ProviderFuture<'a, Completion> {
        Box::pin(self.chat(request))
    }

    fn stream<'a>(&'a self, request: &'a CompletionRequest) -> ProviderFuture<'a, ChunkStream> {
        Box::pin(self.open_stream(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_content_deltas() {
        let payload = r#"{"choices":[{"delta":{"content":"Hi"},"finish_reason":null}]}"#;
        assert_eq!(extract_event(payload), SseEvent::Text("Hi".into()));
    }

    #[test]
    fn role_only_delta_is_empty_text() {
        let payload = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(extract_event(payload), SseEvent::Text(String::new()));
    }

    #[test]
    fn usage_only_chunk_is_empty_text() {
        let payload = r#"{"choices":[],"usage":{"prompt_tokens":3}}"#;
        assert_eq!(extract_event(payload), SseEvent::Text(String::new()));
    }

    #[test]
    fn error_payload_becomes_error_event() {
        let payload = r#"{"error":{"message":"overloaded"}}"#;
        assert_eq!(extract_event(payload), SseEvent::Error("overloaded".into()));
        assert!(matches!(extract_event("{oops"), SseEvent::Error(_)));
    }

    #[test]
    fn request_body_shape() {
        let messages = vec![Message::user("hello")];
        let body = ChatBody {
            model: "gpt-4",
            messages: &messages,
            max_tokens: 0,
            temperature: 0.7,
            stream: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-4");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["stream"], true);
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn base_urls_per_provider() {
        assert_eq!(default_base_url(Provider::DeepSeek), DEEPSEEK_API_BASE);
        let client = OpenAiCompatibleClient::new(
            Provider::OpenRouter,
            "k",
            Some("http://localhost:9/v1/"),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(client.base_url, "http://localhost:9/v1");
        assert_eq!(client.provider(), Provider::OpenRouter);
    }
}
