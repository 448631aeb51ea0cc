//! Subscription endpoints: status, checkout, reconciliation, manual repair

use axum::{extract::State, Json};
use quill_billing::CheckoutResponse;
use quill_shared::Subscription;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    pub subscription: Option<Subscription>,
    pub plan: String,
    pub balance_usd: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub price_id: Option<String>,
}

/// GET /api/subscription — current subscription row and prepaid balance.
///
/// Lookup failures are masked as a free-plan null response; the account page
/// should render even when billing storage is having a bad day.
pub async fn get_subscription(
    State(state): State<AppState>,
    user: AuthUser,
) -> Json<SubscriptionResponse> {
    let subscription = match state.subscriptions.get(user.id).await {
        Ok(sub) => sub,
        Err(e) => {
            tracing::error!(user_id = %user.id, error = %e, "Subscription lookup failed");
            None
        }
    };

    let balance_usd = match state.usage.balance(user.id).await {
        Ok(balance) => balance,
        Err(e) => {
            tracing::error!(user_id = %user.id, error = %e, "Balance lookup failed");
            0.0
        }
    };

    let plan = subscription
        .as_ref()
        .map(|s| s.plan())
        .unwrap_or_default()
        .to_string();

    Json(SubscriptionResponse {
        subscription,
        plan,
        balance_usd,
    })
}

/// POST /api/subscription — create a Stripe checkout session for premium
pub async fn create_checkout(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CheckoutRequest>,
) -> ApiResult<Json<CheckoutResponse>> {
    // Default to the first configured premium price
    let price_id = body
        .price_id
        .or_else(|| state.stripe.config().premium_price_ids.first().cloned())
        .ok_or_else(|| ApiError::BadRequest("No premium price configured".to_string()))?;

    let session = state
        .checkout
        .create_subscription_checkout(user.id, &user.email, &price_id)
        .await?;

    Ok(Json(session.into()))
}

/// POST /api/subscription/update — re-derive local state from Stripe
pub async fn update_subscription(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    let plan = state.subscriptions.reconcile(user.id, &user.email).await?;

    Ok(Json(serde_json::json!({
        "updated": true,
        "plan": plan.to_string(),
    })))
}

/// POST /api/subscription/fix — force the existing row to premium.
/// Manual repair hatch for rows that drifted out of sync with Stripe.
pub async fn fix_subscription(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    state.subscriptions.force_premium(user.id).await?;

    Ok(Json(serde_json::json!({
        "fixed": true,
        "plan": "premium",
    })))
}
