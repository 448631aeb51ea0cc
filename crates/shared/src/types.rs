//! Common types used across Quill

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Subscription plan for billing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    Free,
    Premium,
}

impl Default for PlanType {
    fn default() -> Self {
        Self::Free
    }
}

impl PlanType {
    /// Whether usage is gated by the per-day request counter (free plan)
    /// rather than the prepaid balance (premium plan)
    pub fn uses_daily_limit(&self) -> bool {
        matches!(self, Self::Free)
    }
}

impl std::str::FromStr for PlanType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "premium" => Ok(Self::Premium),
            other => Err(format!("unknown plan type: {}", other)),
        }
    }
}

impl std::fmt::Display for PlanType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Premium => write!(f, "premium"),
        }
    }
}

/// Chat visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Default for Visibility {
    fn default() -> Self {
        Self::Private
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

// =============================================================================
// Database Models
// =============================================================================

/// User account
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    /// NULL for OAuth-provisioned accounts
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Chat conversation owned by a user
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Chat {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub visibility: Visibility,
    pub created_at: OffsetDateTime,
}

/// A single message within a chat; append-only, ordered by creation time
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub has_reasoning: bool,
    pub created_at: OffsetDateTime,
}

/// One step of a stored reasoning chain, linked to an assistant message
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReasoningStep {
    pub id: Uuid,
    pub message_id: Uuid,
    pub step_number: i32,
    pub reasoning: String,
}

/// Up/down vote on a message; at most one per (chat, message)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Vote {
    pub chat_id: Uuid,
    pub message_id: Uuid,
    pub is_upvoted: bool,
}

/// User-authored document (artifact)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub kind: String,
    pub content: String,
    pub created_at: OffsetDateTime,
}

/// Per-user subscription state mirrored from the payment processor
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub price_id: String,
    pub plan_type: String,
    pub status: String,
    pub current_period_start: Option<OffsetDateTime>,
    pub current_period_end: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Subscription {
    /// Parse the stored plan type, defaulting to free on anything unexpected
    pub fn plan(&self) -> PlanType {
        self.plan_type.parse().unwrap_or_default()
    }
}

/// Prepaid USD balance, monotonically decremented by usage cost, floored at 0
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserBalance {
    pub id: Uuid,
    pub user_id: Uuid,
    pub balance_usd: f64,
    pub updated_at: OffsetDateTime,
}

/// Append-only usage ledger row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub chat_id: Option<Uuid>,
    pub message_id: Option<Uuid>,
    pub tokens_used: i64,
    pub cost_usd: f64,
    pub created_at: OffsetDateTime,
}

/// Per-user-per-calendar-day request counter (free plan rate limiting)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DailyUsage {
    pub id: Uuid,
    pub user_id: Uuid,
    pub date: Date,
    pub requests_count: i32,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_type_round_trip() {
        assert_eq!("free".parse::<PlanType>().unwrap(), PlanType::Free);
        assert_eq!("premium".parse::<PlanType>().unwrap(), PlanType::Premium);
        assert_eq!("PREMIUM".parse::<PlanType>().unwrap(), PlanType::Premium);
        assert!("enterprise".parse::<PlanType>().is_err());
        assert_eq!(PlanType::Premium.to_string(), "premium");
    }

    #[test]
    fn test_plan_type_default_is_free() {
        assert_eq!(PlanType::default(), PlanType::Free);
        assert!(PlanType::Free.uses_daily_limit());
        assert!(!PlanType::Premium.uses_daily_limit());
    }

    #[test]
    fn test_message_role_wire_format() {
        assert_eq!(
            serde_json::to_string(&MessageRole::Assistant).unwrap(),
            r#""assistant""#
        );
        assert_eq!(
            serde_json::from_str::<MessageRole>(r#""tool""#).unwrap(),
            MessageRole::Tool
        );
        assert_eq!(MessageRole::User.to_string(), "user");
    }

    #[test]
    fn test_visibility_defaults_to_private() {
        assert_eq!(Visibility::default(), Visibility::Private);
        assert_eq!(
            serde_json::to_string(&Visibility::Public).unwrap(),
            r#""public""#
        );
    }
}
