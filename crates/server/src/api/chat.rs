//! Query submission and answer streaming.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::{HeaderName, CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::info;

use crate::query_store::Query;
use crate::state::AppState;

use super::{ApiError, MessageResponse};

const QUERY_ACCEPTED: &str = "Query received, processing started.";

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub query: Option<String>,
}

/// Accept a query for the next stream session, replacing any earlier one.
pub async fn submit_query(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::InvalidBody(e.body_text()))?;
    let query = req
        .query
        .and_then(Query::new)
        .ok_or(ApiError::QueryRequired)?;

    info!(query_len = query.text().len(), "query accepted");
    state.queries.set(query).await;

    Ok(Json(MessageResponse::new(QUERY_ACCEPTED)))
}

/// Stream the two-stage answer to the most recent query as server-sent events.
///
/// Fails with 400 before any stream framing is sent when no query has been
/// submitted yet.
pub async fn chat_stream(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let query = state.queries.get().await.ok_or(ApiError::NoQueryAvailable)?;

    let events = state.orchestrator.start(query);
    let frames =
        ReceiverStream::new(events).map(|event| Ok::<_, Infallible>(event.to_frame()));

    // x-accel-buffering keeps reverse proxies from holding back events.
    Ok((
        [
            (CONTENT_TYPE, "text/event-stream"),
            (CACHE_CONTROL, "no-cache"),
            (CONNECTION, "keep-alive"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Body::from_stream(frames),
    ))
}
