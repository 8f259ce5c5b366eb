//! Mapping of orchestration failures onto HTTP responses.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use switchboard::{Error, ErrorKind};
use tracing::{error, warn};

/// JSON error body: `{"error": "<kind>", "message": "<detail>"}`.
#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A failed request, ready to render.
#[derive(Debug)]
pub struct ApiError {
    error: Error,
    expose: bool,
}

impl ApiError {
    /// `expose` controls whether non-validation details reach the client.
    pub fn new(error: Error, expose: bool) -> Self {
        Self { error, expose }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    pub fn status(&self) -> StatusCode {
        status_for(self.kind())
    }

    /// Client-visible detail. Validation messages are always shown; the
    /// rest only when exposure is enabled.
    pub fn message(&self) -> Option<String> {
        match self.kind() {
            ErrorKind::Validation => Some(validation_text(&self.error)),
            _ if self.expose => Some(self.error.to_string()),
            _ => None,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.kind().as_str(),
            message: self.message(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(Error::validation(rejection.body_text()), false)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed with {status}: {}", self.error);
        } else {
            warn!("Request rejected with {status}: {}", self.error);
        }

        let mut response = (status, Json(self.body())).into_response();
        if let Error::RateLimit {
            retry_after: Some(wait),
            ..
        } = &self.error
        {
            let secs = wait.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Timeout => StatusCode::REQUEST_TIMEOUT,
        ErrorKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Configuration => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Provider => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn validation_text(error: &Error) -> String {
    match error {
        Error::Validation(message) => message.clone(),
        other => other.to_string(),
    }
}
