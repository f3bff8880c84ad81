use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use crate::errors::AppError;
use crate::models::{
    ChatSession, CreateSessionRequest, SessionIdQuery, SessionListQuery, SessionPage,
    UpdateSessionRequest,
};
use crate::routes::extractors::{ApiJson, CurrentUser};
use crate::state::AppState;

/// GET `/api/sessions?q=&page=&pageSize=` — the caller's sessions, newest first
pub async fn list_sessions_handler(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<SessionListQuery>,
) -> Result<Json<SessionPage>, AppError> {
    Ok(Json(state.sessions.list(&user.user_id, query).await?))
}

/// POST `/api/sessions`
pub async fn create_session_handler(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(request): ApiJson<CreateSessionRequest>,
) -> Result<(StatusCode, Json<ChatSession>), AppError> {
    let session = state.sessions.create(&user.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// PATCH `/api/sessions` — partial overwrite, `id` in the body
pub async fn update_session_handler(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(request): ApiJson<UpdateSessionRequest>,
) -> Result<Json<ChatSession>, AppError> {
    Ok(Json(state.sessions.update(&user.user_id, request).await?))
}

/// DELETE `/api/sessions?id=` — idempotent
pub async fn delete_session_handler(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<SessionIdQuery>,
) -> Result<StatusCode, AppError> {
    let id = query.id.unwrap_or_default();
    state.sessions.delete(&user.user_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET `/api/sessions/{id}`
pub async fn get_session_handler(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<ChatSession>, AppError> {
    Ok(Json(state.sessions.get(&user.user_id, &id).await?))
}
