//! Message voting

use axum::{
    extract::{Query, State},
    http::header,
    Json,
};
use quill_shared::Vote;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::routes::history::HISTORY_CACHE_CONTROL;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteQuery {
    pub chat_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub chat_id: Option<Uuid>,
    pub message_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub vote_type: Option<String>,
}

/// GET /api/vote?chatId= — votes for a chat.
///
/// A missing chat or a failed lookup deliberately returns an empty 200: the
/// UI polls this endpoint and an error banner over votes is worse than
/// showing none. Ownership violations still 401.
pub async fn get_votes(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<VoteQuery>,
) -> ApiResult<([(header::HeaderName, &'static str); 1], Json<Vec<Vote>>)> {
    let cache = [(header::CACHE_CONTROL, HISTORY_CACHE_CONTROL)];

    let Some(chat_id) = query.chat_id else {
        return Err(ApiError::BadRequest("Missing chatId".to_string()));
    };

    let chat = match state.store.get_chat(chat_id).await {
        Ok(Some(chat)) => chat,
        Ok(None) => return Ok((cache, Json(vec![]))),
        Err(e) => {
            tracing::error!(chat_id = %chat_id, error = %e, "Chat lookup failed, returning empty votes");
            return Ok((cache, Json(vec![])));
        }
    };

    if chat.user_id != user.id {
        return Err(ApiError::Unauthorized);
    }

    let votes = match state.store.votes_for_chat(chat_id).await {
        Ok(votes) => votes,
        Err(e) => {
            tracing::error!(chat_id = %chat_id, error = %e, "Vote lookup failed, returning empty votes");
            vec![]
        }
    };

    Ok((cache, Json(votes)))
}

/// PATCH /api/vote — upsert an up/down vote on a message
pub async fn patch_vote(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<VoteRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let (Some(chat_id), Some(message_id), Some(vote_type)) =
        (body.chat_id, body.message_id, body.vote_type.as_deref())
    else {
        return Err(ApiError::BadRequest(
            "chatId, messageId and type are required".to_string(),
        ));
    };

    let is_upvoted = match vote_type {
        "up" => true,
        "down" => false,
        other => {
            return Err(ApiError::BadRequest(format!(
                "Invalid vote type: {}",
                other
            )))
        }
    };

    let chat = state.store.get_chat(chat_id).await?.ok_or(ApiError::NotFound)?;
    if chat.user_id != user.id {
        return Err(ApiError::Unauthorized);
    }

    state.store.upsert_vote(chat_id, message_id, is_upvoted).await?;
    Ok(Json(json!({ "success": true })))
}
