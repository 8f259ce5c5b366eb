//! REST API endpoint handlers.
//!
//! Chat endpoints stream plain text; everything else is JSON. All failures
//! render through [`ApiError`].

use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use switchboard::catalog::Model;
use switchboard::orchestrator::{ChatStream, Orchestrator};
use switchboard::{Error, UsageInfo};
use tracing::{info, warn};

use crate::error::{ApiError, ErrorBody};

/// Response header carrying the serving model's id.
pub const MODEL_ID_HEADER: HeaderName = HeaderName::from_static("x-model-id");
/// Response header carrying the request id.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Shared application state passed to all handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    fn fail(&self, error: Error) -> ApiError {
        ApiError::new(error, self.orchestrator.config().expose_errors)
    }
}

/// Request body for POST /api/chat.
#[derive(Deserialize, Debug)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
}

/// Request body for POST /api/chat/model and POST /api/complete.
#[derive(Deserialize, Debug)]
pub struct ModelChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// Response body for POST /api/complete.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CompleteResponse {
    pub text: String,
    pub model: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageInfo>,
    pub estimated_cost_usd: f64,
}

/// Response body for the model listings.
#[derive(Serialize, Debug)]
pub struct ModelList {
    pub models: Vec<Model>,
    pub count: usize,
    pub timestamp: String,
}

impl ModelList {
    fn new(models: Vec<Model>) -> Self {
        Self {
            count: models.len(),
            models,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Failure body for the model listings. `models` is always empty.
#[derive(Serialize, Debug)]
pub struct ModelListError {
    #[serde(flatten)]
    pub error: ErrorBody,
    pub models: Vec<Model>,
}

/// Turn an open chat stream into a `text/plain` response.
///
/// A mid-stream failure aborts the body; the status line has already gone
/// out by then.
fn stream_response(chat: ChatStream) -> Response {
    let request_id = chat.request_id.clone();
    let model_id = chat.model.id.clone();
    let body = Body::from_stream(chat.stream.inspect_err(move |e| {
        warn!("Stream {request_id} aborted: {e}");
    }));

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    if let Ok(value) = HeaderValue::from_str(&model_id) {
        headers.insert(MODEL_ID_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&chat.request_id) {
        headers.insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// POST /api/chat: Stream a reply from the recommended model.
pub async fn post_chat(
    State(app): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    let chat = app
        .orchestrator
        .stream_chat(&body.message, None)
        .await
        .map_err(|e| app.fail(e))?;
    info!("Chat {} streaming from {}", chat.request_id, chat.model.id);
    Ok(stream_response(chat))
}

/// POST /api/chat/model: Stream a reply from an explicitly chosen model.
pub async fn post_chat_model(
    State(app): State<AppState>,
    body: Result<Json<ModelChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    let Some(model) = body.model.as_deref() else {
        return Err(app.fail(Error::validation("model is required")));
    };
    let chat = app
        .orchestrator
        .stream_chat(&body.message, Some(model))
        .await
        .map_err(|e| app.fail(e))?;
    info!("Chat {} streaming from {}", chat.request_id, chat.model.id);
    Ok(stream_response(chat))
}

/// POST /api/complete: Wait for a full reply and report its estimated cost.
pub async fn post_complete(
    State(app): State<AppState>,
    body: Result<Json<ModelChatRequest>, JsonRejection>,
) -> Result<Json<CompleteResponse>, ApiError> {
    let Json(body) = body?;
    let reply = app
        .orchestrator
        .complete_chat(&body.message, body.model.as_deref())
        .await
        .map_err(|e| app.fail(e))?;
    Ok(Json(CompleteResponse {
        text: reply.text,
        model: reply.model.id,
        request_id: reply.request_id,
        usage: reply.usage,
        estimated_cost_usd: reply.estimated_cost_usd,
    }))
}

/// GET /api/models: The static catalog.
pub async fn get_models(State(app): State<AppState>) -> Json<ModelList> {
    Json(ModelList::new(app.orchestrator.list_models().to_vec()))
}

/// GET /api/models/openrouter: The live OpenRouter catalog.
///
/// On failure the body still carries an empty `models` array next to the
/// error, so callers must check `error` rather than treating the list as
/// "no models available".
pub async fn get_openrouter_models(State(app): State<AppState>) -> Response {
    match app.orchestrator.list_openrouter_models().await {
        Ok(models) => Json(ModelList::new(models)).into_response(),
        Err(e) => {
            let failure = app.fail(e);
            let status = if failure.status() == StatusCode::SERVICE_UNAVAILABLE {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            warn!("OpenRouter catalog unavailable: {failure:?}");
            let mut error = failure.body();
            error
                .message
                .get_or_insert_with(|| "failed to fetch OpenRouter models".to_string());
            (
                status,
                Json(ModelListError {
                    error,
                    models: Vec::new(),
                }),
            )
                .into_response()
        }
    }
}

/// GET /api/health: Liveness probe.
pub async fn get_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_defaults_missing_message() {
        let req: ChatRequest = serde_json::from_str("{}").unwrap();
        assert!(req.message.is_empty());
    }

    #[test]
    fn model_chat_request_deserializes() {
        let json = r#"{"message":"hi","model":"gpt-4"}"#;
        let req: ModelChatRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.message, "hi");
        assert_eq!(req.model.as_deref(), Some("gpt-4"));
    }

    #[test]
    fn list_error_shape() {
        let body = ModelListError {
            error: ErrorBody {
                error: "provider_error",
                message: Some("failed".into()),
            },
            models: Vec::new(),
        };
        let json = serde_json::to_value(body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"error": "provider_error", "message": "failed", "models": []})
        );
    }

    #[test]
    fn complete_response_is_camel_case() {
        let json = serde_json::to_value(CompleteResponse {
            text: "t".into(),
            model: "gpt-4".into(),
            request_id: "req-1".into(),
            usage: None,
            estimated_cost_usd: 0.5,
        })
        .unwrap();
        assert_eq!(json["estimatedCostUsd"], 0.5);
        assert_eq!(json["requestId"], "req-1");
        assert!(json.get("usage").is_none());
    }
}
