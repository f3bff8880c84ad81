use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use futures_util::{Stream, StreamExt};

use crate::errors::AppError;
use crate::models::ChatStreamRequest;
use crate::routes::extractors::{ApiJson, MaybeUser};
use crate::state::AppState;

/// POST `/api/chat/stream` — relays one generated reply as Server-Sent Events.
///
/// Each frame is a single `data:` line carrying a token/meta/error envelope,
/// followed by `data: [DONE]` on normal completion.
pub async fn chat_stream_handler(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    ApiJson(request): ApiJson<ChatStreamRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let owner_id = user.as_ref().map(|u| u.user_id.as_str());
    let frames = state.chat.open_stream(owner_id, request).await?;
    let events = frames.map(|frame| Ok::<_, Infallible>(Event::default().data(frame.payload())));
    Ok(Sse::new(events))
}
