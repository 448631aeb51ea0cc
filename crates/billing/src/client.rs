//! Stripe client configuration

use quill_shared::PlanType;
use stripe::Client;

use crate::error::{BillingError, BillingResult};

/// Configuration for Stripe billing
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Stripe secret API key
    pub secret_key: String,
    /// Stripe webhook signing secret
    pub webhook_secret: String,
    /// Price IDs that map to the premium plan
    pub premium_price_ids: Vec<String>,
    /// Base URL for success/cancel redirects
    pub app_base_url: String,
}

impl StripeConfig {
    /// Create config from environment variables
    pub fn from_env() -> BillingResult<Self> {
        Ok(Self {
            secret_key: std::env::var("STRIPE_SECRET_KEY")
                .map_err(|_| BillingError::Config("STRIPE_SECRET_KEY not set".to_string()))?,
            webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET")
                .map_err(|_| BillingError::Config("STRIPE_WEBHOOK_SECRET not set".to_string()))?,
            premium_price_ids: std::env::var("STRIPE_PREMIUM_PRICE_IDS")
                .map(|s| {
                    s.split(',')
                        .map(|p| p.trim().to_string())
                        .filter(|p| !p.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            app_base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
        })
    }

    /// Derive a plan type from a Stripe price ID.
    ///
    /// Only explicitly configured price IDs map to premium. An unknown ID
    /// maps to free and gets a warning in the log, so a missing
    /// STRIPE_PREMIUM_PRICE_IDS entry shows up as downgraded users, not as
    /// silently granted premium.
    pub fn plan_for_price_id(&self, price_id: &str) -> PlanType {
        if self.premium_price_ids.iter().any(|p| p == price_id) {
            return PlanType::Premium;
        }
        if price_id != "price_free" {
            tracing::warn!(price_id = %price_id, "Unknown Stripe price ID, treating as free plan");
        }
        PlanType::Free
    }
}

/// Stripe billing client
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

impl StripeClient {
    /// Create a new Stripe client from config
    pub fn new(config: StripeConfig) -> Self {
        let client = Client::new(&config.secret_key);
        Self { client, config }
    }

    /// Create a new Stripe client from environment variables
    pub fn from_env() -> BillingResult<Self> {
        let config = StripeConfig::from_env()?;
        Ok(Self::new(config))
    }

    /// Get the inner Stripe client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the config
    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_prices(prices: &[&str]) -> StripeConfig {
        StripeConfig {
            secret_key: "sk_test".to_string(),
            webhook_secret: "whsec_test".to_string(),
            premium_price_ids: prices.iter().map(|p| p.to_string()).collect(),
            app_base_url: "http://localhost:3000".to_string(),
        }
    }

    #[test]
    fn test_configured_price_maps_to_premium() {
        let config = config_with_prices(&["price_1R3ak6GaijbBxKEh"]);
        assert_eq!(
            config.plan_for_price_id("price_1R3ak6GaijbBxKEh"),
            PlanType::Premium
        );
    }

    #[test]
    fn test_unknown_price_maps_to_free() {
        let config = config_with_prices(&["price_known"]);
        // Unknown price_-prefixed IDs are NOT assumed premium
        assert_eq!(config.plan_for_price_id("price_mystery"), PlanType::Free);
        assert_eq!(config.plan_for_price_id("price_free"), PlanType::Free);
        assert_eq!(config.plan_for_price_id("garbage"), PlanType::Free);
    }
}
