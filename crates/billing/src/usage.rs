//! Usage accounting: the admission gate and the usage recorder
//!
//! Free-plan admission and counting are the same statement: a conditional
//! upsert on `daily_usage` that only increments while the counter is under
//! the limit. There is no separate read, so two concurrent requests cannot
//! both observe "9 of 10" and both get in.

use quill_shared::{DailyUsage, PlanType, UsageRecord, UserBalance};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

/// Usage accounting knobs, explicit rather than process-wide constants
#[derive(Debug, Clone)]
pub struct UsageConfig {
    /// Requests per calendar day (UTC) on the free plan
    pub free_daily_limit: i32,
    /// USD charged per 1000 estimated tokens
    pub token_cost_per_1k: f64,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            free_daily_limit: 10,
            token_cost_per_1k: 0.002,
        }
    }
}

/// What a recorded completion cost
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageCharge {
    pub tokens: i64,
    pub cost_usd: f64,
}

pub struct UsageLedger {
    pool: PgPool,
    config: UsageConfig,
}

impl UsageLedger {
    pub fn new(pool: PgPool, config: UsageConfig) -> Self {
        Self { pool, config }
    }

    pub fn config(&self) -> &UsageConfig {
        &self.config
    }

    /// Rough token count for billing: one token per four characters, rounded up
    pub fn estimate_tokens(text_len: usize) -> i64 {
        (text_len as i64 + 3) / 4
    }

    /// Cost in USD for an estimated token count
    pub fn cost_for_tokens(&self, tokens: i64) -> f64 {
        tokens as f64 / 1000.0 * self.config.token_cost_per_1k
    }

    /// Admit or reject a chat request for the given plan.
    ///
    /// Free: one atomic increment-and-check against the daily counter; the
    /// request has consumed quota the moment it is admitted, whatever happens
    /// to the completion afterwards.
    /// Premium: admitted unless the prepaid balance has gone negative. The
    /// balance is floored at zero by the recorder, so in practice a premium
    /// user with an exhausted balance still passes; the boundary is `< 0`,
    /// not `<= 0`. The daily counter is still incremented (without gating on
    /// it), so a plan downgrade mid-day does not hand out a fresh free quota.
    pub async fn check_and_consume(&self, user_id: Uuid, plan: PlanType) -> BillingResult<()> {
        match plan {
            PlanType::Free => self.try_consume_daily(user_id).await,
            PlanType::Premium => {
                let balance = self.balance(user_id).await?;
                if balance < 0.0 {
                    tracing::warn!(user_id = %user_id, balance_usd = balance, "Premium request rejected, negative balance");
                    return Err(BillingError::InsufficientBalance);
                }
                // Counter is advisory for premium; a failure here must not
                // block a paid request
                if let Err(e) = self.count_daily(user_id).await {
                    tracing::warn!(user_id = %user_id, error = %e, "Daily counter update failed");
                }
                Ok(())
            }
        }
    }

    /// Atomically count this request against today's quota.
    /// Returns DailyLimitReached if the counter is already at the limit.
    async fn try_consume_daily(&self, user_id: Uuid) -> BillingResult<()> {
        let today = OffsetDateTime::now_utc().date();

        let admitted = sqlx::query_as::<_, DailyUsage>(
            r#"
            INSERT INTO daily_usage (user_id, date, requests_count)
            VALUES ($1, $2, 1)
            ON CONFLICT (user_id, date) DO UPDATE
                SET requests_count = daily_usage.requests_count + 1
                WHERE daily_usage.requests_count < $3
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(today)
        .bind(self.config.free_daily_limit)
        .fetch_optional(&self.pool)
        .await?;

        match admitted {
            Some(usage) => {
                tracing::debug!(user_id = %user_id, requests_today = usage.requests_count, "Free request admitted");
                Ok(())
            }
            None => {
                tracing::info!(user_id = %user_id, limit = self.config.free_daily_limit, "Daily usage limit reached");
                Err(BillingError::DailyLimitReached)
            }
        }
    }

    /// Increment the daily counter without enforcing the limit
    async fn count_daily(&self, user_id: Uuid) -> BillingResult<()> {
        let today = OffsetDateTime::now_utc().date();

        sqlx::query(
            r#"
            INSERT INTO daily_usage (user_id, date, requests_count)
            VALUES ($1, $2, 1)
            ON CONFLICT (user_id, date) DO UPDATE
                SET requests_count = daily_usage.requests_count + 1
            "#,
        )
        .bind(user_id)
        .bind(today)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Current prepaid balance, treating a missing row as zero
    pub async fn balance(&self, user_id: Uuid) -> BillingResult<f64> {
        let row = sqlx::query_as::<_, UserBalance>(
            "SELECT * FROM user_balances WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|b| b.balance_usd).unwrap_or(0.0))
    }

    /// Record a completion: append a ledger row and debit the balance,
    /// flooring at zero. Callers treat failure as non-fatal for the chat.
    pub async fn record(
        &self,
        user_id: Uuid,
        chat_id: Option<Uuid>,
        message_id: Option<Uuid>,
        total_chars: usize,
    ) -> BillingResult<UsageCharge> {
        let tokens = Self::estimate_tokens(total_chars);
        let cost_usd = self.cost_for_tokens(tokens);

        let record = sqlx::query_as::<_, UsageRecord>(
            r#"
            INSERT INTO usage_records (user_id, chat_id, message_id, tokens_used, cost_usd)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(chat_id)
        .bind(message_id)
        .bind(tokens)
        .bind(cost_usd)
        .fetch_one(&self.pool)
        .await?;

        sqlx::query(
            r#"
            UPDATE user_balances
            SET balance_usd = GREATEST(0, balance_usd - $2), updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(cost_usd)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            user_id = %user_id,
            record_id = %record.id,
            tokens = record.tokens_used,
            cost_usd = record.cost_usd,
            "Usage recorded"
        );

        Ok(UsageCharge {
            tokens: record.tokens_used,
            cost_usd: record.cost_usd,
        })
    }

    /// Credit a prepaid balance (used by payment webhooks and admin tools)
    pub async fn credit(&self, user_id: Uuid, amount_usd: f64) -> BillingResult<()> {
        if amount_usd < 0.0 {
            return Err(BillingError::Internal(
                "Credit amount must be non-negative".to_string(),
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO user_balances (user_id, balance_usd)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE
                SET balance_usd = user_balances.balance_usd + EXCLUDED.balance_usd,
                    updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(amount_usd)
        .execute(&self.pool)
        .await?;

        tracing::info!(user_id = %user_id, amount_usd = amount_usd, "Balance credited");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn ledger() -> UsageLedger {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        UsageLedger::new(pool, UsageConfig::default())
    }

    #[test]
    fn test_token_estimate_rounds_up() {
        assert_eq!(UsageLedger::estimate_tokens(0), 0);
        assert_eq!(UsageLedger::estimate_tokens(1), 1);
        assert_eq!(UsageLedger::estimate_tokens(4), 1);
        assert_eq!(UsageLedger::estimate_tokens(5), 2);
        assert_eq!(UsageLedger::estimate_tokens(200), 50);
    }

    #[tokio::test]
    async fn test_cost_math() {
        let ledger = ledger();
        // 50 tokens at $0.002 per 1K = $0.0001
        let cost = ledger.cost_for_tokens(50);
        assert!((cost - 0.0001).abs() < 1e-12);

        // Debiting that from a $0.01 balance leaves $0.0099
        let remaining = (0.01f64 - cost).max(0.0);
        assert!((remaining - 0.0099).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_debit_floors_at_zero() {
        let ledger = ledger();
        let cost = ledger.cost_for_tokens(10_000_000);
        assert!(cost > 0.005);
        assert_eq!((0.005f64 - cost).max(0.0), 0.0);
    }

    #[test]
    fn test_default_config() {
        let config = UsageConfig::default();
        assert_eq!(config.free_daily_limit, 10);
        assert!((config.token_cost_per_1k - 0.002).abs() < 1e-12);
    }

    async fn test_ledger() -> (UsageLedger, Uuid) {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect(&url)
            .await
            .expect("Failed to connect");

        let (user_id,): (Uuid,) =
            sqlx::query_as("INSERT INTO users (email) VALUES ($1) RETURNING id")
                .bind(format!("usage-{}@test.local", Uuid::new_v4()))
                .fetch_one(&pool)
                .await
                .expect("Failed to create user");

        (UsageLedger::new(pool, UsageConfig::default()), user_id)
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_free_gate_admits_up_to_limit_then_rejects() {
        let (ledger, user_id) = test_ledger().await;

        for _ in 0..10 {
            ledger
                .check_and_consume(user_id, PlanType::Free)
                .await
                .expect("Request under the limit should be admitted");
        }

        // The 11th request in the same day is rejected
        assert!(matches!(
            ledger.check_and_consume(user_id, PlanType::Free).await,
            Err(BillingError::DailyLimitReached)
        ));
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_record_debits_and_floors_balance() {
        let (ledger, user_id) = test_ledger().await;

        ledger.credit(user_id, 0.01).await.expect("Credit failed");

        // 200 chars = 50 tokens = $0.0001
        let charge = ledger
            .record(user_id, None, None, 200)
            .await
            .expect("Record failed");
        assert_eq!(charge.tokens, 50);

        let balance = ledger.balance(user_id).await.expect("Balance lookup failed");
        assert!((balance - 0.0099).abs() < 1e-9);

        // A charge larger than the balance floors at zero instead of going negative
        ledger
            .record(user_id, None, None, 100_000_000)
            .await
            .expect("Record failed");
        let balance = ledger.balance(user_id).await.expect("Balance lookup failed");
        assert_eq!(balance, 0.0);

        // Premium admission checks `< 0`, so a floored-to-zero balance still passes
        ledger
            .check_and_consume(user_id, PlanType::Premium)
            .await
            .expect("Zero balance should still be admitted");
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_premium_requests_count_toward_daily_quota() {
        let (ledger, user_id) = test_ledger().await;

        // Premium requests are never gated on the counter, but they fill it
        for _ in 0..10 {
            ledger
                .check_and_consume(user_id, PlanType::Premium)
                .await
                .expect("Premium request should be admitted");
        }

        // A downgrade mid-day does not reset the free quota
        assert!(matches!(
            ledger.check_and_consume(user_id, PlanType::Free).await,
            Err(BillingError::DailyLimitReached)
        ));
    }
}
