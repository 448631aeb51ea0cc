//! Stripe Checkout sessions

use sqlx::PgPool;
use stripe::{
    CheckoutSession, CheckoutSessionMode, CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCustomer, Customer, CustomerId,
};
use uuid::Uuid;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

/// Checkout service for creating Stripe checkout sessions
pub struct CheckoutService {
    stripe: StripeClient,
    pool: PgPool,
}

impl CheckoutService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self { stripe, pool }
    }

    /// Get the user's existing Stripe customer ID, or create a new customer
    /// and tag it with the user ID for webhook correlation
    pub async fn get_or_create_customer(
        &self,
        user_id: Uuid,
        email: &str,
    ) -> BillingResult<String> {
        let existing: Option<(Option<String>,)> =
            sqlx::query_as("SELECT stripe_customer_id FROM subscriptions WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        if let Some((Some(customer_id),)) = existing {
            return Ok(customer_id);
        }

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("user_id".to_string(), user_id.to_string());

        let customer = Customer::create(
            self.stripe.inner(),
            CreateCustomer {
                email: Some(email),
                metadata: Some(metadata),
                ..Default::default()
            },
        )
        .await?;

        tracing::info!(
            user_id = %user_id,
            customer_id = %customer.id,
            "Created Stripe customer"
        );

        Ok(customer.id.to_string())
    }

    /// Create a subscription-mode checkout session for the given price
    pub async fn create_subscription_checkout(
        &self,
        user_id: Uuid,
        email: &str,
        price_id: &str,
    ) -> BillingResult<CheckoutSession> {
        let customer_id = self.get_or_create_customer(user_id, email).await?;
        let customer_id = customer_id
            .parse::<CustomerId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))?;

        let base_url = &self.stripe.config().app_base_url;
        let success_url = format!("{}/?subscription_success=true", base_url);
        let cancel_url = format!("{}/?subscription_canceled=true", base_url);

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("user_id".to_string(), user_id.to_string());
        metadata.insert("price_id".to_string(), price_id.to_string());

        let params = CreateCheckoutSession {
            customer: Some(customer_id),
            mode: Some(CheckoutSessionMode::Subscription),
            line_items: Some(vec![CreateCheckoutSessionLineItems {
                price: Some(price_id.to_string()),
                quantity: Some(1),
                ..Default::default()
            }]),
            success_url: Some(&success_url),
            cancel_url: Some(&cancel_url),
            metadata: Some(metadata),
            allow_promotion_codes: Some(true),
            billing_address_collection: Some(stripe::CheckoutSessionBillingAddressCollection::Auto),
            ..Default::default()
        };

        let session = CheckoutSession::create(self.stripe.inner(), params).await?;

        tracing::info!(
            user_id = %user_id,
            session_id = %session.id,
            price_id = %price_id,
            "Created checkout session"
        );

        Ok(session)
    }
}

/// Response for creating a checkout session
#[derive(Debug, serde::Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
}

impl From<CheckoutSession> for CheckoutResponse {
    fn from(session: CheckoutSession) -> Self {
        Self {
            session_id: session.id.to_string(),
            url: session.url,
        }
    }
}
