//! Chat endpoints: request/response generation and SSE streaming.

use crate::AppState;
use crate::api::models::ChatRequest;
use crate::chat::{ChatResponse, StreamEvent};
use crate::errors::Error;
use axum::{
    Json,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use std::convert::Infallible;

#[utoipa::path(post, path = "/api/chat", tag = "chat", request_body = ChatRequest,
    responses(
        (status = 200, description = "Assistant reply with citations", body = ChatResponse),
        (status = 404, description = "Session not found"),
        (status = 503, description = "Model provider unavailable"),
    ))]
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, Error> {
    if request.message.trim().is_empty() {
        return Err(Error::Validation {
            message: "message must not be empty".to_string(),
        });
    }
    let response = state
        .chat
        .send_message(&request.message, &request.to_options())
        .await?;
    Ok(Json(response))
}

#[utoipa::path(post, path = "/api/chat/stream", tag = "chat", request_body = ChatRequest,
    responses(
        (status = 200, description = "Server-sent token stream terminated by [DONE]"),
        (status = 404, description = "Session not found"),
    ))]
pub async fn chat_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, Error> {
    if request.message.trim().is_empty() {
        return Err(Error::Validation {
            message: "message must not be empty".to_string(),
        });
    }

    let (session_id, events) = state
        .chat
        .clone()
        .stream_message(&request.message, &request.to_options())
        .await?;

    let stream = events.map(move |event| {
        let event = match event {
            StreamEvent::Token(token) => Event::default().data(token),
            StreamEvent::Done => Event::default().data("[DONE]"),
            StreamEvent::Error(message) => Event::default().data(format!("[ERROR] {message}")),
        };
        Ok(event)
    });

    tracing::debug!(session_id = %session_id, "chat stream opened");
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
