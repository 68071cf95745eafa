//! Session management endpoints.

use crate::AppState;
use crate::api::models::{Pagination, SessionCreateRequest, SessionSummaryResponse};
use crate::db::handlers::Sessions;
use crate::db::models::{MessageRecord, SessionRecord};
use crate::errors::{Entity, Error};
use crate::types::SessionId;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

#[utoipa::path(get, path = "/api/sessions", tag = "sessions", params(Pagination),
    responses((status = 200, description = "Session list", body = Vec<SessionRecord>)))]
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<SessionRecord>>, Error> {
    Ok(Json(Sessions::list(&state.pool, page.skip, page.limit).await?))
}

#[utoipa::path(post, path = "/api/sessions", tag = "sessions", request_body = SessionCreateRequest,
    responses((status = 201, description = "Session created", body = SessionRecord)))]
pub async fn create_session(
    State(state): State<AppState>,
    body: Option<Json<SessionCreateRequest>>,
) -> Result<(StatusCode, Json<SessionRecord>), Error> {
    let request = body.map(|Json(b)| b);
    let (title, system_prompt, max_tokens, temperature) = match request {
        Some(request) => (
            request.title,
            request.system_prompt,
            request
                .max_context_tokens
                .unwrap_or(state.config.chat.default_max_context_tokens),
            request
                .temperature
                .map(|t| t.clamp(0.0, 2.0))
                .unwrap_or(state.config.chat.default_temperature),
        ),
        None => (
            None,
            None,
            state.config.chat.default_max_context_tokens,
            state.config.chat.default_temperature,
        ),
    };
    let session = Sessions::create(
        &state.pool,
        title.as_deref(),
        system_prompt.as_deref(),
        max_tokens,
        temperature,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[utoipa::path(get, path = "/api/sessions/{id}", tag = "sessions",
    params(("id" = SessionId, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session", body = SessionRecord),
        (status = 404, description = "Session not found"),
    ))]
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> Result<Json<SessionRecord>, Error> {
    let session = Sessions::get(&state.pool, id).await?.ok_or(Error::NotFound {
        entity: Entity::Session,
        id: id.to_string(),
    })?;
    Ok(Json(session))
}

#[utoipa::path(delete, path = "/api/sessions/{id}", tag = "sessions",
    params(("id" = SessionId, Path, description = "Session id")),
    responses(
        (status = 204, description = "Session deleted"),
        (status = 404, description = "Session not found"),
    ))]
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> Result<StatusCode, Error> {
    if Sessions::delete(&state.pool, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound {
            entity: Entity::Session,
            id: id.to_string(),
        })
    }
}

#[utoipa::path(get, path = "/api/sessions/{id}/messages", tag = "sessions",
    params(("id" = SessionId, Path, description = "Session id")),
    responses(
        (status = 200, description = "Messages in order", body = Vec<MessageRecord>),
        (status = 404, description = "Session not found"),
    ))]
pub async fn session_messages(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> Result<Json<Vec<MessageRecord>>, Error> {
    if Sessions::get(&state.pool, id).await?.is_none() {
        return Err(Error::NotFound {
            entity: Entity::Session,
            id: id.to_string(),
        });
    }
    Ok(Json(Sessions::messages(&state.pool, id).await?))
}

#[utoipa::path(get, path = "/api/sessions/{id}/summary", tag = "sessions",
    params(("id" = SessionId, Path, description = "Session id")),
    responses(
        (status = 200, description = "Stored conversation summary", body = SessionSummaryResponse),
        (status = 404, description = "Session not found"),
    ))]
pub async fn session_summary(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> Result<Json<SessionSummaryResponse>, Error> {
    let session = Sessions::get(&state.pool, id).await?.ok_or(Error::NotFound {
        entity: Entity::Session,
        id: id.to_string(),
    })?;
    Ok(Json(SessionSummaryResponse {
        session_id: session.id,
        summary: session.summary,
        summary_message_count: session.summary_message_count,
        total_tokens: session.total_tokens,
        max_context_tokens: session.max_context_tokens,
    }))
}
