use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use deckhand_core::Error;
use serde::{Deserialize, Serialize};
use tracing::error;

// Input: a free-text question
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub question: Option<String>,
}

// Output: the answer text, whatever produced it
#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub answer: String,
}

#[derive(Debug, Deserialize)]
pub struct CardQuery {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeckQuery {
    #[serde(rename = "deckId")]
    pub deck_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecommendQuery {
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub const UPSTREAM_MESSAGE: &str = "There was an error contacting an upstream service.";
pub const CONFIGURATION_MESSAGE: &str = "The OpenAI API key is not configured on the server.";
pub const TIMEOUT_MESSAGE: &str = "The assistant took too long to respond.";

/// Request-boundary error. Callers only ever see the fixed message.
#[derive(Debug)]
pub struct AppError(pub Error);

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, capitalize(&self.0.to_string())),
            Error::Upstream(_) => (StatusCode::INTERNAL_SERVER_ERROR, UPSTREAM_MESSAGE.to_string()),
            Error::Configuration(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                CONFIGURATION_MESSAGE.to_string(),
            ),
            Error::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, TIMEOUT_MESSAGE.to_string()),
        };

        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
