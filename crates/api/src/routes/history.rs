//! Chat history listing

use axum::{extract::State, http::header, Json};
use quill_shared::Chat;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

/// Short private cache so rapid sidebar refreshes don't hit the database
pub const HISTORY_CACHE_CONTROL: &str = "private, max-age=30, stale-while-revalidate=60";

/// GET /api/history — the session user's chats, newest first
pub async fn get_history(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<([(header::HeaderName, &'static str); 1], Json<Vec<Chat>>)> {
    let chats = state.store.chats_for_user(user.id).await?;
    Ok((
        [(header::CACHE_CONTROL, HISTORY_CACHE_CONTROL)],
        Json(chats),
    ))
}
