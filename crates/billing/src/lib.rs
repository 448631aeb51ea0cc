//! Quill billing: Stripe subscriptions, checkout, webhooks, and usage accounting.

pub mod checkout;
pub mod client;
pub mod error;
pub mod subscriptions;
pub mod usage;
pub mod webhooks;

pub use checkout::{CheckoutResponse, CheckoutService};
pub use client::{StripeClient, StripeConfig};
pub use error::{BillingError, BillingResult};
pub use subscriptions::{SubscriptionService, SubscriptionUpdate};
pub use usage::{UsageCharge, UsageConfig, UsageLedger};
pub use webhooks::{WebhookEvent, WebhookService};
