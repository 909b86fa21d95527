//! HTTP endpoints.
//!
//! Shared response types and the API error live here; handlers live in the
//! sub-modules.

mod chat;
mod health;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

// ── Shared types ─────────────────────────────────────────────────

/// `{ "message": ... }` body used by every non-stream response.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors surfaced before any streaming begins.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Query is required")]
    QueryRequired,
    #[error("No query available, send a query first.")]
    NoQueryAvailable,
    #[error("{0}")]
    InvalidBody(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::QueryRequired | ApiError::NoQueryAvailable | ApiError::InvalidBody(_) => {
                StatusCode::BAD_REQUEST
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(MessageResponse::new(self.to_string()))).into_response()
    }
}

// ── Re-exports ───────────────────────────────────────────────────

pub use chat::{chat_stream, submit_query};
pub use health::health;
