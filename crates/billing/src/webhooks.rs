//! Stripe webhook verification and event dispatch
//!
//! Signature verification is done by hand (HMAC-SHA256 over the raw payload,
//! constant-time compare) instead of through async-stripe's `Webhook` helper,
//! which rejects events whose API version it was not generated against.
//! Event payloads are read as plain JSON for the same reason: we pull out the
//! handful of fields we need and re-retrieve the subscription from the API
//! for anything authoritative.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::PgPool;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::subscriptions::SubscriptionService;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a webhook timestamp before it is rejected as a replay
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// A verified webhook event, reduced to the fields we act on
#[derive(Debug)]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: String,
    /// The `data.object` payload
    pub object: serde_json::Value,
}

pub struct WebhookService {
    stripe: StripeClient,
    subscriptions: SubscriptionService,
}

impl WebhookService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        let subscriptions = SubscriptionService::new(stripe.clone(), pool);
        Self {
            stripe,
            subscriptions,
        }
    }

    /// Verify the `Stripe-Signature` header against the raw request body and
    /// parse the event. Fails closed: any malformed header, stale timestamp,
    /// or signature mismatch is an error.
    pub fn verify_event(&self, payload: &str, signature_header: &str) -> BillingResult<WebhookEvent> {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        self.verify_event_at(payload, signature_header, now)
    }

    fn verify_event_at(
        &self,
        payload: &str,
        signature_header: &str,
        now: i64,
    ) -> BillingResult<WebhookEvent> {
        let (timestamp, provided_sigs) = parse_signature_header(signature_header)?;

        if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
            return Err(BillingError::WebhookSignatureInvalid(
                "Timestamp outside tolerance".to_string(),
            ));
        }

        let signed_payload = format!("{}.{}", timestamp, payload);
        let mut mac =
            HmacSha256::new_from_slice(self.stripe.config().webhook_secret.as_bytes())
                .map_err(|_| {
                    BillingError::WebhookSignatureInvalid("HMAC init failed".to_string())
                })?;
        mac.update(signed_payload.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        // Stripe sends one v1 entry per active signing secret during secret
        // rotation; any one matching is sufficient
        let matched = provided_sigs
            .iter()
            .any(|sig| expected.as_bytes().ct_eq(sig.as_bytes()).unwrap_u8() == 1);
        if !matched {
            return Err(BillingError::WebhookSignatureInvalid(
                "Signature mismatch".to_string(),
            ));
        }

        parse_event(payload)
    }

    /// Dispatch a verified event. Unrecognized event types are logged and
    /// ignored; the caller still acknowledges them with a 200.
    pub async fn handle_event(&self, event: WebhookEvent) -> BillingResult<()> {
        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            "Handling Stripe webhook event"
        );

        match event.event_type.as_str() {
            "checkout.session.completed" => self.handle_checkout_completed(&event.object).await,
            "invoice.payment_succeeded" => self.handle_invoice_paid(&event.object).await,
            "customer.subscription.updated" => self.handle_subscription_changed(&event.object).await,
            "customer.subscription.deleted" => self.handle_subscription_deleted(&event.object).await,
            other => {
                tracing::debug!(event_type = %other, "Ignoring unhandled webhook event type");
                Ok(())
            }
        }
    }

    async fn handle_checkout_completed(&self, object: &serde_json::Value) -> BillingResult<()> {
        let user_id = self.resolve_user(object).await?;
        let subscription_id = string_field(object, "subscription").ok_or_else(|| {
            BillingError::WebhookPayloadInvalid(
                "checkout.session.completed without subscription".to_string(),
            )
        })?;

        self.sync_by_id(user_id, &subscription_id).await
    }

    async fn handle_invoice_paid(&self, object: &serde_json::Value) -> BillingResult<()> {
        let user_id = self.resolve_user(object).await?;

        // Not every invoice belongs to a subscription (one-off charges don't)
        let Some(subscription_id) = string_field(object, "subscription") else {
            tracing::debug!(user_id = %user_id, "Invoice without subscription, nothing to sync");
            return Ok(());
        };

        self.sync_by_id(user_id, &subscription_id).await
    }

    async fn handle_subscription_changed(&self, object: &serde_json::Value) -> BillingResult<()> {
        let user_id = self.resolve_user(object).await?;
        let subscription_id = string_field(object, "id").ok_or_else(|| {
            BillingError::WebhookPayloadInvalid("Subscription event without id".to_string())
        })?;

        self.sync_by_id(user_id, &subscription_id).await
    }

    async fn handle_subscription_deleted(&self, object: &serde_json::Value) -> BillingResult<()> {
        let user_id = self.resolve_user(object).await?;
        self.subscriptions.mark_canceled(user_id).await
    }

    /// Re-retrieve the subscription from the API and apply it locally.
    /// The event payload itself is never treated as authoritative.
    async fn sync_by_id(&self, user_id: Uuid, subscription_id: &str) -> BillingResult<()> {
        let sub_id = subscription_id
            .parse::<stripe::SubscriptionId>()
            .map_err(|e| {
                BillingError::WebhookPayloadInvalid(format!("Invalid subscription ID: {}", e))
            })?;
        let subscription = stripe::Subscription::retrieve(self.stripe.inner(), &sub_id, &[]).await?;
        let plan = self.subscriptions.sync_from_stripe(user_id, &subscription).await?;

        tracing::info!(user_id = %user_id, plan_type = %plan, "Subscription synced from webhook");
        Ok(())
    }

    /// Resolve the local user for an event object: prefer the `user_id` we
    /// stamped into metadata at checkout, fall back to the customer mapping.
    async fn resolve_user(&self, object: &serde_json::Value) -> BillingResult<Uuid> {
        if let Some(raw) = object
            .get("metadata")
            .and_then(|m| m.get("user_id"))
            .and_then(|v| v.as_str())
        {
            if let Ok(user_id) = raw.parse::<Uuid>() {
                return Ok(user_id);
            }
            tracing::warn!(user_id = %raw, "Webhook metadata user_id is not a UUID");
        }

        let customer_id = string_field(object, "customer").ok_or_else(|| {
            BillingError::WebhookPayloadInvalid("Event object has no customer".to_string())
        })?;

        self.subscriptions
            .user_for_customer(&customer_id)
            .await?
            .ok_or(BillingError::CustomerNotFound(customer_id))
    }
}

/// Extract a string field that Stripe may deliver either as a bare ID string
/// or as an expanded object with an `id`
fn string_field(object: &serde_json::Value, key: &str) -> Option<String> {
    match object.get(key)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(o) => o.get("id")?.as_str().map(str::to_string),
        _ => None,
    }
}

/// Parse `t=<timestamp>,v1=<hex>[,v1=<hex>...]` from the Stripe-Signature
/// header; multiple v1 entries appear while a signing secret is being rotated
fn parse_signature_header(header: &str) -> BillingResult<(i64, Vec<String>)> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) if !value.is_empty() => signatures.push(value.to_string()),
            _ => {}
        }
    }

    match timestamp {
        Some(t) if !signatures.is_empty() => Ok((t, signatures)),
        _ => Err(BillingError::WebhookSignatureInvalid(
            "Malformed signature header".to_string(),
        )),
    }
}

fn parse_event(payload: &str) -> BillingResult<WebhookEvent> {
    let value: serde_json::Value = serde_json::from_str(payload)
        .map_err(|e| BillingError::WebhookPayloadInvalid(format!("Invalid JSON: {}", e)))?;

    let id = value
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| BillingError::WebhookPayloadInvalid("Event missing id".to_string()))?
        .to_string();
    let event_type = value
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| BillingError::WebhookPayloadInvalid("Event missing type".to_string()))?
        .to_string();
    let object = value
        .get("data")
        .and_then(|d| d.get("object"))
        .cloned()
        .ok_or_else(|| {
            BillingError::WebhookPayloadInvalid("Event missing data.object".to_string())
        })?;

    Ok(WebhookEvent {
        id,
        event_type,
        object,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    fn sign(payload: &str, timestamp: i64, secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.{}", timestamp, payload).as_bytes());
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    fn service() -> WebhookService {
        let config = crate::client::StripeConfig {
            secret_key: "sk_test".to_string(),
            webhook_secret: SECRET.to_string(),
            premium_price_ids: vec![],
            app_base_url: "http://localhost:3000".to_string(),
        };
        // Pool is never touched by verification
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        WebhookService::new(StripeClient::new(config), pool)
    }

    const PAYLOAD: &str = r#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{"customer":"cus_1"}}}"#;

    #[tokio::test]
    async fn test_valid_signature_accepted() {
        let svc = service();
        let now = 1_700_000_000;
        let header = sign(PAYLOAD, now, SECRET);

        let event = svc.verify_event_at(PAYLOAD, &header, now).unwrap();
        assert_eq!(event.id, "evt_1");
        assert_eq!(event.event_type, "checkout.session.completed");
        assert_eq!(event.object["customer"], "cus_1");
    }

    #[tokio::test]
    async fn test_wrong_secret_rejected() {
        let svc = service();
        let now = 1_700_000_000;
        let header = sign(PAYLOAD, now, "whsec_other");

        let err = svc.verify_event_at(PAYLOAD, &header, now).unwrap_err();
        assert!(matches!(err, BillingError::WebhookSignatureInvalid(_)));
    }

    #[tokio::test]
    async fn test_tampered_payload_rejected() {
        let svc = service();
        let now = 1_700_000_000;
        let header = sign(PAYLOAD, now, SECRET);

        let tampered = PAYLOAD.replace("cus_1", "cus_2");
        assert!(svc.verify_event_at(&tampered, &header, now).is_err());
    }

    #[tokio::test]
    async fn test_stale_timestamp_rejected() {
        let svc = service();
        let then = 1_700_000_000;
        let header = sign(PAYLOAD, then, SECRET);

        // 301 seconds later
        let err = svc
            .verify_event_at(PAYLOAD, &header, then + SIGNATURE_TOLERANCE_SECS + 1)
            .unwrap_err();
        assert!(matches!(err, BillingError::WebhookSignatureInvalid(_)));
    }

    #[tokio::test]
    async fn test_malformed_header_rejected() {
        let svc = service();
        assert!(svc.verify_event_at(PAYLOAD, "not-a-header", 0).is_err());
        assert!(svc.verify_event_at(PAYLOAD, "t=abc,v1=", 0).is_err());
        assert!(svc.verify_event_at(PAYLOAD, "v1=deadbeef", 0).is_err());
    }

    #[test]
    fn test_string_field_handles_expanded_objects() {
        let bare = serde_json::json!({"customer": "cus_9"});
        let expanded = serde_json::json!({"customer": {"id": "cus_9", "email": "a@b.c"}});
        assert_eq!(string_field(&bare, "customer").as_deref(), Some("cus_9"));
        assert_eq!(string_field(&expanded, "customer").as_deref(), Some("cus_9"));
        assert_eq!(string_field(&bare, "missing"), None);
    }

    #[test]
    fn test_parse_signature_header() {
        let (t, sigs) = parse_signature_header("t=1700000000,v1=abcdef").unwrap();
        assert_eq!(t, 1_700_000_000);
        assert_eq!(sigs, vec!["abcdef"]);

        // Extra schemes are ignored, all v1 entries are kept
        let (t, sigs) = parse_signature_header("t=5,v1=aa,v0=bb,v1=cc").unwrap();
        assert_eq!(t, 5);
        assert_eq!(sigs, vec!["aa", "cc"]);
    }

    #[tokio::test]
    async fn test_any_rotated_signature_verifies() {
        let svc = service();
        let now = 1_700_000_000;

        // During secret rotation Stripe signs with every active secret and
        // sends one v1 entry each; the one we can reproduce must be enough
        let current = sign(PAYLOAD, now, SECRET);
        let mut mac = HmacSha256::new_from_slice("whsec_retired".as_bytes()).unwrap();
        mac.update(format!("{}.{}", now, PAYLOAD).as_bytes());
        let retired = hex::encode(mac.finalize().into_bytes());

        let header = format!("t={},v1={},{}", now, retired, current.split_once(',').unwrap().1);
        let event = svc.verify_event_at(PAYLOAD, &header, now).unwrap();
        assert_eq!(event.id, "evt_1");

        // Two entries from unknown secrets still fail
        let header = format!("t={},v1={},v1={}", now, retired, retired);
        assert!(svc.verify_event_at(PAYLOAD, &header, now).is_err());
    }
}
