pub mod api_routes;
pub mod auth_routes;
pub mod extractors;
pub mod session_routes;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use api_routes::chat_stream_handler;
use auth_routes::{login_handler, logout_handler, register_handler};
use session_routes::{
    create_session_handler, delete_session_handler, get_session_handler, list_sessions_handler,
    update_session_handler,
};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat/stream", post(chat_stream_handler))
        .route(
            "/api/sessions",
            get(list_sessions_handler)
                .post(create_session_handler)
                .patch(update_session_handler)
                .delete(delete_session_handler),
        )
        .route("/api/sessions/{id}", get(get_session_handler))
        .route("/api/register", post(register_handler))
        .route("/api/login", post(login_handler))
        .route("/api/logout", post(logout_handler))
        .route("/health", get(|| async { "OK" }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
