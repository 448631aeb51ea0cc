//! Shared application state

use std::sync::Arc;

use quill_billing::{
    CheckoutService, StripeClient, SubscriptionService, UsageConfig, UsageLedger, WebhookService,
};
use sqlx::PgPool;

use crate::auth::{AuthState, JwtManager};
use crate::config::Config;
use crate::provider::ProviderClient;
use crate::store::ChatStore;

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub stripe: StripeClient,
    pub jwt: JwtManager,
    pub store: Arc<ChatStore>,
    pub provider: Arc<ProviderClient>,
    pub checkout: Arc<CheckoutService>,
    pub subscriptions: Arc<SubscriptionService>,
    pub webhooks: Arc<WebhookService>,
    pub usage: Arc<UsageLedger>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config, stripe: StripeClient) -> Self {
        let jwt = JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours);
        let usage_config = UsageConfig {
            free_daily_limit: config.free_daily_limit,
            token_cost_per_1k: config.token_cost_per_1k,
        };
        let provider = ProviderClient::new(
            config.openrouter_api_key.clone(),
            config.openrouter_base_url.clone(),
        );

        Self {
            jwt,
            store: Arc::new(ChatStore::new(pool.clone())),
            provider: Arc::new(provider),
            checkout: Arc::new(CheckoutService::new(stripe.clone(), pool.clone())),
            subscriptions: Arc::new(SubscriptionService::new(stripe.clone(), pool.clone())),
            webhooks: Arc::new(WebhookService::new(stripe.clone(), pool.clone())),
            stripe,
            usage: Arc::new(UsageLedger::new(pool.clone(), usage_config)),
            config: Arc::new(config),
            pool,
        }
    }

    /// State subset used by the auth middleware
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            jwt: self.jwt.clone(),
        }
    }
}
