use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::errors::AppError;
use crate::models::{Credentials, LoginResponse, RegisteredUser};
use crate::routes::extractors::{ApiJson, CurrentUser};
use crate::state::AppState;

/// POST `/api/register`
pub async fn register_handler(
    State(state): State<AppState>,
    ApiJson(credentials): ApiJson<Credentials>,
) -> Result<(StatusCode, Json<RegisteredUser>), AppError> {
    let user = state.auth.register(credentials).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// POST `/api/login` — returns a bearer token
pub async fn login_handler(
    State(state): State<AppState>,
    ApiJson(credentials): ApiJson<Credentials>,
) -> Result<Json<LoginResponse>, AppError> {
    Ok(Json(state.auth.login(credentials).await?))
}

/// POST `/api/logout` — revokes the presented token
pub async fn logout_handler(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<StatusCode, AppError> {
    state.auth.logout(&user.token).await?;
    Ok(StatusCode::NO_CONTENT)
}
