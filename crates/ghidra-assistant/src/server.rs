//! HTTP front end.
//!
//! - `POST /chat` answers with a `text/event-stream`, one
//!   `data: <event json>` frame per event.
//! - `GET /status/:job_id` passes the backend's job status through.

use std::convert::Infallible;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ghidra_assistant_core::ChatRequest;
use ghidra_assistant_core::event::{self, Event};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::trace::TraceLayer;

use crate::Assistant;

/// Number of events buffered for a slow client.
const EVENT_BUFFER: usize = 64;

#[derive(Debug, Default, Deserialize)]
struct ChatBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    job_id: Option<String>,
}

/// Creates the application router.
pub fn router(assistant: Assistant) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/status/:job_id", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(assistant)
}

async fn chat(
    State(assistant): State<Assistant>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            debug!("unreadable chat body: {rejection}");
            ChatBody::default()
        }
    };
    let non_empty = |s: &String| !s.is_empty();
    let (Some(message), Some(job_id)) = (
        body.message.filter(non_empty),
        body.job_id.filter(non_empty),
    ) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Message and job_id are required" })),
        )
            .into_response();
    };

    info!("chat request for job {job_id}");
    let (tx, rx) = event::channel(EVENT_BUFFER);
    tokio::spawn(async move {
        let watcher = tx.clone();
        tokio::select! {
            _ = assistant.chat(ChatRequest::new(message, job_id), tx) => {}
            _ = watcher.closed() => {
                debug!("client disconnected, conversation cancelled");
            }
        }
    });

    let stream = ReceiverStream::new(rx)
        .map(|event| Ok::<_, Infallible>(to_sse_event(&event)));
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

fn to_sse_event(event: &Event) -> SseEvent {
    SseEvent::default().json_data(event).unwrap_or_else(|err| {
        error!("failed to encode event: {err}");
        SseEvent::default().data(r#"{"type":"error","content":"internal error"}"#)
    })
}

async fn status(
    State(assistant): State<Assistant>,
    Path(job_id): Path<String>,
) -> Response {
    match assistant.status(&job_id).await {
        Ok(status) => Json(status).into_response(),
        Err(err) => {
            warn!("failed to get status of job {job_id}: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("Failed to get status: {err}") })),
            )
                .into_response()
        }
    }
}
