//! Subscription state reconciliation
//!
//! The local `subscriptions` table mirrors Stripe: one row per user, updated
//! from webhook events and from on-demand reconciliation when a webhook was
//! missed. Stripe is the source of truth for everything except the derived
//! `plan_type`, which comes from the configured price-ID map.

use quill_shared::{PlanType, Subscription};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

/// Fields written on every subscription upsert
#[derive(Debug, Clone)]
pub struct SubscriptionUpdate {
    pub user_id: Uuid,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub price_id: String,
    pub plan_type: PlanType,
    pub status: String,
    pub current_period_start: Option<OffsetDateTime>,
    pub current_period_end: Option<OffsetDateTime>,
}

pub struct SubscriptionService {
    stripe: StripeClient,
    pool: PgPool,
}

impl SubscriptionService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self { stripe, pool }
    }

    /// Get the user's active subscription row, if any
    pub async fn get_active(&self, user_id: Uuid) -> BillingResult<Option<Subscription>> {
        let sub = sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions WHERE user_id = $1 AND status = 'active'",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sub)
    }

    /// Get the user's subscription row regardless of status
    pub async fn get(&self, user_id: Uuid) -> BillingResult<Option<Subscription>> {
        let sub = sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sub)
    }

    /// Find the local user for a Stripe customer ID
    pub async fn user_for_customer(&self, customer_id: &str) -> BillingResult<Option<Uuid>> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT user_id FROM subscriptions WHERE stripe_customer_id = $1")
                .bind(customer_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(id,)| id))
    }

    /// Upsert the user's single subscription row
    pub async fn upsert(&self, update: SubscriptionUpdate) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                user_id, stripe_customer_id, stripe_subscription_id,
                price_id, plan_type, status,
                current_period_start, current_period_end, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            ON CONFLICT (user_id) DO UPDATE SET
                stripe_customer_id = EXCLUDED.stripe_customer_id,
                stripe_subscription_id = EXCLUDED.stripe_subscription_id,
                price_id = EXCLUDED.price_id,
                plan_type = EXCLUDED.plan_type,
                status = EXCLUDED.status,
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                updated_at = NOW()
            "#,
        )
        .bind(update.user_id)
        .bind(&update.stripe_customer_id)
        .bind(&update.stripe_subscription_id)
        .bind(&update.price_id)
        .bind(update.plan_type.to_string())
        .bind(&update.status)
        .bind(update.current_period_start)
        .bind(update.current_period_end)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            user_id = %update.user_id,
            plan_type = %update.plan_type,
            status = %update.status,
            "Subscription upserted"
        );

        Ok(())
    }

    /// Create the free subscription and zero balance rows for a new user
    pub async fn initialize_free(&self, user_id: Uuid) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (user_id, price_id, plan_type, status)
            VALUES ($1, 'price_free', 'free', 'active')
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO user_balances (user_id, balance_usd)
            VALUES ($1, 0)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Apply the processor's current state for a subscription to the local row
    pub async fn sync_from_stripe(
        &self,
        user_id: Uuid,
        subscription: &stripe::Subscription,
    ) -> BillingResult<PlanType> {
        let price_id = subscription
            .items
            .data
            .first()
            .and_then(|item| item.price.as_ref())
            .map(|price| price.id.to_string())
            .ok_or_else(|| {
                BillingError::StripeApi(format!(
                    "Subscription {} has no price item",
                    subscription.id
                ))
            })?;

        let plan_type = self.stripe.config().plan_for_price_id(&price_id);

        let existing = self.get(user_id).await?;
        if let Some(existing) = &existing {
            if existing.plan() != plan_type {
                tracing::info!(
                    user_id = %user_id,
                    stored = %existing.plan_type,
                    actual = %plan_type,
                    "Plan type mismatch with Stripe, correcting"
                );
            }
        }

        self.upsert(SubscriptionUpdate {
            user_id,
            stripe_customer_id: Some(subscription.customer.id().to_string()),
            stripe_subscription_id: Some(subscription.id.to_string()),
            price_id,
            plan_type,
            status: subscription.status.to_string(),
            current_period_start: OffsetDateTime::from_unix_timestamp(
                subscription.current_period_start,
            )
            .ok(),
            current_period_end: OffsetDateTime::from_unix_timestamp(
                subscription.current_period_end,
            )
            .ok(),
        })
        .await?;

        Ok(plan_type)
    }

    /// Re-derive local subscription state from Stripe on demand.
    ///
    /// Covers the missed-webhook case: if the local row carries Stripe IDs the
    /// subscription is re-retrieved; otherwise the customer is looked up by
    /// email and their active subscription adopted.
    pub async fn reconcile(&self, user_id: Uuid, email: &str) -> BillingResult<PlanType> {
        let existing = self.get(user_id).await?;

        if let Some(sub_id) = existing
            .as_ref()
            .and_then(|s| s.stripe_subscription_id.clone())
        {
            let sub_id = sub_id
                .parse::<stripe::SubscriptionId>()
                .map_err(|e| BillingError::StripeApi(format!("Invalid subscription ID: {}", e)))?;
            let subscription =
                stripe::Subscription::retrieve(self.stripe.inner(), &sub_id, &[]).await?;
            return self.sync_from_stripe(user_id, &subscription).await;
        }

        // No Stripe IDs stored locally: search the processor by email
        let customers = stripe::Customer::list(
            self.stripe.inner(),
            &stripe::ListCustomers {
                email: Some(email),
                limit: Some(1),
                ..Default::default()
            },
        )
        .await?;

        let customer = customers
            .data
            .into_iter()
            .next()
            .ok_or_else(|| BillingError::CustomerNotFound(email.to_string()))?;

        let subscriptions = stripe::Subscription::list(
            self.stripe.inner(),
            &stripe::ListSubscriptions {
                customer: Some(customer.id.clone()),
                status: Some(stripe::SubscriptionStatusFilter::Active),
                limit: Some(1),
                ..Default::default()
            },
        )
        .await?;

        let subscription = subscriptions
            .data
            .into_iter()
            .next()
            .ok_or_else(|| BillingError::SubscriptionNotFound(customer.id.to_string()))?;

        self.sync_from_stripe(user_id, &subscription).await
    }

    /// Force the subscription back to the free plan with canceled status
    pub async fn mark_canceled(&self, user_id: Uuid) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE subscriptions
            SET plan_type = 'free', status = 'canceled', updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        tracing::info!(user_id = %user_id, "Subscription canceled, reverted to free plan");
        Ok(())
    }

    /// Manual repair: force the existing row to premium.
    /// Returns SubscriptionNotFound if the user has no subscription row.
    pub async fn force_premium(&self, user_id: Uuid) -> BillingResult<()> {
        let result = sqlx::query(
            "UPDATE subscriptions SET plan_type = 'premium', updated_at = NOW() WHERE user_id = $1",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BillingError::SubscriptionNotFound(user_id.to_string()));
        }

        tracing::info!(user_id = %user_id, "Subscription plan forced to premium");
        Ok(())
    }
}
