//! Chat persistence: users, chats, messages, reasoning chains, votes, documents

use quill_shared::{Chat, Document, Message, MessageRole, ReasoningStep, User, Vote};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// A message with its reasoning chain reassembled, as returned to clients
#[derive(Debug, Clone, Serialize)]
pub struct MessageWithReasoning {
    #[serde(flatten)]
    pub message: Message,
    /// Reasoning steps joined with blank lines, for flagged messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

pub struct ChatStore {
    pool: PgPool,
}

impl ChatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub async fn create_user(&self, email: &str, password_hash: &str) -> ApiResult<User> {
        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (email, password_hash) VALUES ($1, $2) RETURNING *",
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn user_by_email(&self, email: &str) -> ApiResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    pub async fn user_by_id(&self, id: Uuid) -> ApiResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    // =========================================================================
    // Chats
    // =========================================================================

    pub async fn get_chat(&self, id: Uuid) -> ApiResult<Option<Chat>> {
        let chat = sqlx::query_as::<_, Chat>("SELECT * FROM chats WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(chat)
    }

    pub async fn create_chat(&self, id: Uuid, user_id: Uuid, title: &str) -> ApiResult<Chat> {
        let chat = sqlx::query_as::<_, Chat>(
            "INSERT INTO chats (id, user_id, title) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(id)
        .bind(user_id)
        .bind(title)
        .fetch_one(&self.pool)
        .await?;

        Ok(chat)
    }

    /// The user's chats, newest first
    pub async fn chats_for_user(&self, user_id: Uuid) -> ApiResult<Vec<Chat>> {
        let chats = sqlx::query_as::<_, Chat>(
            "SELECT * FROM chats WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(chats)
    }

    /// Delete a chat and everything hanging off it in one transaction,
    /// so a partial failure never leaves orphaned rows
    pub async fn delete_chat(&self, chat_id: Uuid) -> ApiResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM usage_records WHERE chat_id = $1")
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM votes WHERE chat_id = $1")
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "DELETE FROM reasoning_steps WHERE message_id IN (SELECT id FROM messages WHERE chat_id = $1)",
        )
        .bind(chat_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM messages WHERE chat_id = $1")
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chats WHERE id = $1")
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(chat_id = %chat_id, "Chat deleted");
        Ok(())
    }

    // =========================================================================
    // Messages and reasoning
    // =========================================================================

    pub async fn save_message(
        &self,
        id: Uuid,
        chat_id: Uuid,
        role: MessageRole,
        content: &str,
        has_reasoning: bool,
    ) -> ApiResult<Message> {
        let message = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (id, chat_id, role, content, has_reasoning)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(chat_id)
        .bind(role)
        .bind(content)
        .bind(has_reasoning)
        .fetch_one(&self.pool)
        .await?;

        Ok(message)
    }

    /// Stored reasoning chain for a message, in step order
    pub async fn reasoning_steps(&self, message_id: Uuid) -> ApiResult<Vec<ReasoningStep>> {
        let steps = sqlx::query_as::<_, ReasoningStep>(
            "SELECT * FROM reasoning_steps WHERE message_id = $1 ORDER BY step_number ASC",
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(steps)
    }

    /// Store an ordered reasoning chain for a message
    pub async fn save_reasoning_steps(&self, message_id: Uuid, steps: &[String]) -> ApiResult<()> {
        let mut tx = self.pool.begin().await?;

        for (index, step) in steps.iter().enumerate() {
            sqlx::query(
                "INSERT INTO reasoning_steps (message_id, step_number, reasoning) VALUES ($1, $2, $3)",
            )
            .bind(message_id)
            .bind(index as i32 + 1)
            .bind(step)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Messages for a chat in order, with reasoning chains reassembled for
    /// messages that carry one
    pub async fn messages_with_reasoning(
        &self,
        chat_id: Uuid,
    ) -> ApiResult<Vec<MessageWithReasoning>> {
        let messages = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE chat_id = $1 ORDER BY created_at ASC",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        let mut result = Vec::with_capacity(messages.len());
        for message in messages {
            let reasoning = if message.has_reasoning {
                let steps = self.reasoning_steps(message.id).await?;
                if steps.is_empty() {
                    None
                } else {
                    Some(
                        steps
                            .into_iter()
                            .map(|step| step.reasoning)
                            .collect::<Vec<_>>()
                            .join("\n\n"),
                    )
                }
            } else {
                None
            };

            result.push(MessageWithReasoning { message, reasoning });
        }

        Ok(result)
    }

    // =========================================================================
    // Votes
    // =========================================================================

    pub async fn votes_for_chat(&self, chat_id: Uuid) -> ApiResult<Vec<Vote>> {
        let votes = sqlx::query_as::<_, Vote>("SELECT * FROM votes WHERE chat_id = $1")
            .bind(chat_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(votes)
    }

    /// Record a vote, replacing any previous vote on the same message
    pub async fn upsert_vote(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        is_upvoted: bool,
    ) -> ApiResult<()> {
        sqlx::query(
            r#"
            INSERT INTO votes (chat_id, message_id, is_upvoted)
            VALUES ($1, $2, $3)
            ON CONFLICT (chat_id, message_id) DO UPDATE SET is_upvoted = EXCLUDED.is_upvoted
            "#,
        )
        .bind(chat_id)
        .bind(message_id)
        .bind(is_upvoted)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Documents
    // =========================================================================

    /// All versions of a document, oldest first
    pub async fn document_versions(&self, id: Uuid, user_id: Uuid) -> ApiResult<Vec<Document>> {
        let docs = sqlx::query_as::<_, Document>(
            "SELECT * FROM documents WHERE id = $1 AND user_id = $2 ORDER BY created_at ASC",
        )
        .bind(id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(docs)
    }

    /// Append a new version of a document
    pub async fn save_document(
        &self,
        id: Uuid,
        user_id: Uuid,
        title: &str,
        kind: &str,
        content: &str,
    ) -> ApiResult<Document> {
        let doc = sqlx::query_as::<_, Document>(
            r#"
            INSERT INTO documents (id, user_id, title, kind, content)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(title)
        .bind(kind)
        .bind(content)
        .fetch_one(&self.pool)
        .await?;

        Ok(doc)
    }

    /// Verify a chat exists and belongs to the user.
    /// NotFound when missing, Unauthorized when owned by someone else.
    pub async fn authorize_chat(&self, chat_id: Uuid, user_id: Uuid) -> ApiResult<Chat> {
        let chat = self.get_chat(chat_id).await?.ok_or(ApiError::NotFound)?;
        if chat.user_id != user_id {
            return Err(ApiError::Unauthorized);
        }
        Ok(chat)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    async fn test_store() -> (ChatStore, Uuid) {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect(&url)
            .await
            .expect("Failed to connect");

        let store = ChatStore::new(pool);
        let user = store
            .create_user(
                &format!("store-{}@test.local", Uuid::new_v4()),
                "$argon2id$fake",
            )
            .await
            .expect("Failed to create user");

        (store, user.id)
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_reasoning_round_trip() {
        let (store, user_id) = test_store().await;

        let chat_id = Uuid::new_v4();
        let chat = store.create_chat(chat_id, user_id, "Test chat").await.unwrap();
        assert_eq!(chat.visibility, quill_shared::Visibility::Private);

        let message = store
            .save_message(
                Uuid::new_v4(),
                chat_id,
                MessageRole::Assistant,
                "The answer.",
                true,
            )
            .await
            .unwrap();
        assert_eq!(message.role, MessageRole::Assistant);
        store
            .save_reasoning_steps(
                message.id,
                &["s1".to_string(), "s2".to_string(), "s3".to_string()],
            )
            .await
            .unwrap();

        let messages = store.messages_with_reasoning(chat_id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].message.has_reasoning);
        assert_eq!(messages[0].reasoning.as_deref(), Some("s1\n\ns2\n\ns3"));
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_cascade_delete_leaves_no_orphans() {
        let (store, user_id) = test_store().await;

        let chat_id = Uuid::new_v4();
        store.create_chat(chat_id, user_id, "Doomed chat").await.unwrap();
        let message = store
            .save_message(Uuid::new_v4(), chat_id, MessageRole::Assistant, "Bye.", true)
            .await
            .unwrap();
        store
            .save_reasoning_steps(message.id, &["only step".to_string()])
            .await
            .unwrap();
        store.upsert_vote(chat_id, message.id, true).await.unwrap();

        store.delete_chat(chat_id).await.unwrap();

        assert!(store.get_chat(chat_id).await.unwrap().is_none());
        assert!(store.messages_with_reasoning(chat_id).await.unwrap().is_empty());
        assert!(store.votes_for_chat(chat_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_vote_upsert_replaces_previous() {
        let (store, user_id) = test_store().await;

        let chat_id = Uuid::new_v4();
        store.create_chat(chat_id, user_id, "Voting chat").await.unwrap();
        let message = store
            .save_message(Uuid::new_v4(), chat_id, MessageRole::Assistant, "Hi.", false)
            .await
            .unwrap();

        store.upsert_vote(chat_id, message.id, true).await.unwrap();
        store.upsert_vote(chat_id, message.id, false).await.unwrap();

        let votes = store.votes_for_chat(chat_id).await.unwrap();
        assert_eq!(votes.len(), 1);
        assert!(!votes[0].is_upvoted);
    }
}
