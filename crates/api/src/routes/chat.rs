//! Chat completion endpoints: streaming POST, transactional DELETE,
//! and message listing with reasoning chains

use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::Stream;
use quill_shared::{MessageRole, PlanType};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::provider::{
    is_reasoning_model, split_reasoning, split_steps, ChatMessage, StreamEvent,
    REASONING_SYSTEM_PROMPT,
};
use crate::state::AppState;
use crate::store::MessageWithReasoning;

const TITLE_MAX_CHARS: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<IncomingMessage>,
    pub id: Option<Uuid>,
    pub selected_chat_model: Option<String>,
    // Legacy client shape
    pub chat_id: Option<Uuid>,
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub role: String,
    /// Clients may send structured content; only plain strings are used
    #[serde(default)]
    pub content: serde_json::Value,
}

impl IncomingMessage {
    fn text(&self) -> &str {
        self.content.as_str().unwrap_or("")
    }
}

#[derive(Debug, Deserialize)]
pub struct DeleteChatQuery {
    pub id: Option<Uuid>,
}

/// POST /api/chat — gate, persist, and stream a completion as SSE
pub async fn post_chat(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<ChatRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let chat_id = body.id.or(body.chat_id).unwrap_or_else(Uuid::new_v4);
    let model_alias = body
        .selected_chat_model
        .or(body.model)
        .unwrap_or_else(|| state.config.model_map.default_alias());

    if body.messages.is_empty() {
        return Err(ApiError::BadRequest("No messages provided".to_string()));
    }

    // A missing subscription row means free; a failed lookup is treated the
    // same rather than failing the chat
    let plan = match state.subscriptions.get(user.id).await {
        Ok(sub) => sub.map(|s| s.plan()).unwrap_or_default(),
        Err(e) => {
            tracing::warn!(user_id = %user.id, error = %e, "Plan lookup failed, assuming free");
            PlanType::Free
        }
    };

    // Admission: atomic daily counter for free, balance check for premium
    state.usage.check_and_consume(user.id, plan).await?;

    // Persist the chat row (first message) and the latest user message.
    // Failures here are logged but never fail the completion.
    persist_user_turn(&state, &user, chat_id, &body.messages).await;

    let reasoning_enabled = {
        let name = state
            .config
            .model_map
            .display_name(&model_alias)
            .unwrap_or(&model_alias);
        is_reasoning_model(name, &state.config.reasoning_model_keywords)
    };

    let mut provider_messages = Vec::with_capacity(body.messages.len() + 1);
    if reasoning_enabled {
        provider_messages.push(ChatMessage::new("system", REASONING_SYSTEM_PROMPT));
    }
    provider_messages.extend(
        body.messages
            .iter()
            .map(|m| ChatMessage::new(m.role.clone(), m.text())),
    );

    // Record estimated prompt usage up front; recording failures are non-fatal
    let prompt_chars: usize = body.messages.iter().map(|m| m.text().len()).sum();
    if let Err(e) = state
        .usage
        .record(user.id, Some(chat_id), None, prompt_chars)
        .await
    {
        tracing::error!(user_id = %user.id, error = %e, "Usage recording failed");
    }

    let model_id = state.config.model_map.resolve(&model_alias);
    let mut deltas = state
        .provider
        .stream_completion(&model_id, &provider_messages)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, model_id = %model_id, "Provider request failed");
            ApiError::Provider(e.to_string())
        })?;

    let (tx, rx) = mpsc::channel::<Event>(64);

    // Forward deltas to the client while accumulating the full completion;
    // persistence happens after the stream ends so it never blocks tokens
    tokio::spawn(async move {
        let mut full_text = String::new();

        while let Some(event) = deltas.recv().await {
            match event {
                StreamEvent::Delta(delta) => {
                    full_text.push_str(&delta);
                    let payload = json!({ "type": "text-delta", "text": delta });
                    if tx
                        .send(Event::default().data(payload.to_string()))
                        .await
                        .is_err()
                    {
                        // Client disconnected; still fall through to persist
                        break;
                    }
                }
                StreamEvent::Done => break,
                StreamEvent::Error(e) => {
                    tracing::error!(error = %e, "Completion stream failed");
                    let payload = json!({ "type": "error", "message": "Stream interrupted" });
                    let _ = tx.send(Event::default().data(payload.to_string())).await;
                    break;
                }
            }
        }

        persist_assistant_turn(&state, chat_id, &full_text, reasoning_enabled).await;

        let payload = json!({ "type": "finish" });
        let _ = tx.send(Event::default().data(payload.to_string())).await;
    });

    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// DELETE /api/chat?id= — remove a chat and all dependent rows
pub async fn delete_chat(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<DeleteChatQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let chat_id = query
        .id
        .ok_or_else(|| ApiError::BadRequest("Missing chat id".to_string()))?;

    // Whether the chat is missing or someone else's, the caller learns nothing
    let chat = state.store.get_chat(chat_id).await?.ok_or(ApiError::NotFound)?;
    if chat.user_id != user.id {
        return Err(ApiError::NotFound);
    }

    state.store.delete_chat(chat_id).await?;
    Ok(Json(json!({ "deleted": true })))
}

/// GET /api/chat/:id/messages — messages with reasoning chains reassembled
pub async fn get_chat_messages(
    State(state): State<AppState>,
    user: AuthUser,
    Path(chat_id): Path<Uuid>,
) -> ApiResult<Json<Vec<MessageWithReasoning>>> {
    state.store.authorize_chat(chat_id, user.id).await?;
    let messages = state.store.messages_with_reasoning(chat_id).await?;
    Ok(Json(messages))
}

async fn persist_user_turn(
    state: &AppState,
    user: &AuthUser,
    chat_id: Uuid,
    messages: &[IncomingMessage],
) {
    let Some(last_user_message) = messages.iter().rev().find(|m| m.role == "user") else {
        return;
    };

    match state.store.get_chat(chat_id).await {
        Ok(None) => {
            let title: String = last_user_message.text().chars().take(TITLE_MAX_CHARS).collect();
            let title = if title.is_empty() { "New chat".to_string() } else { title };
            if let Err(e) = state.store.create_chat(chat_id, user.id, &title).await {
                tracing::error!(chat_id = %chat_id, error = %e, "Failed to create chat row");
                return;
            }
        }
        Ok(Some(chat)) => {
            if chat.user_id != user.id {
                tracing::warn!(chat_id = %chat_id, user_id = %user.id, "Chat owned by another user, skipping persistence");
                return;
            }
        }
        Err(e) => {
            tracing::error!(chat_id = %chat_id, error = %e, "Chat lookup failed, skipping persistence");
            return;
        }
    }

    if let Err(e) = state
        .store
        .save_message(
            Uuid::new_v4(),
            chat_id,
            MessageRole::User,
            last_user_message.text(),
            false,
        )
        .await
    {
        tracing::error!(chat_id = %chat_id, error = %e, "Failed to save user message");
    }
}

async fn persist_assistant_turn(
    state: &AppState,
    chat_id: Uuid,
    full_text: &str,
    reasoning_enabled: bool,
) {
    if full_text.is_empty() {
        return;
    }

    let (reasoning, answer) = if reasoning_enabled {
        split_reasoning(full_text)
    } else {
        (None, full_text.to_string())
    };

    let message_id = Uuid::new_v4();
    let has_reasoning = reasoning.is_some();

    if let Err(e) = state
        .store
        .save_message(message_id, chat_id, MessageRole::Assistant, &answer, has_reasoning)
        .await
    {
        tracing::error!(chat_id = %chat_id, error = %e, "Failed to save assistant message");
        return;
    }

    if let Some(reasoning) = reasoning {
        let steps = split_steps(&reasoning);
        if let Err(e) = state.store.save_reasoning_steps(message_id, &steps).await {
            tracing::error!(message_id = %message_id, error = %e, "Failed to save reasoning chain");
        }
    }
}
