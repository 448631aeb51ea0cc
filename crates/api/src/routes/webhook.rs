//! Stripe webhook receiver

use axum::{extract::State, http::HeaderMap, http::StatusCode};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// POST /api/webhook/stripe (also mounted at /api/webhook).
///
/// Fail-closed: a missing or invalid signature is a 400 before any state is
/// touched. Unhandled event types are acknowledged with 200 so Stripe stops
/// redelivering them.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<StatusCode> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Stripe webhook missing signature header");
            ApiError::BadRequest("Missing Stripe signature".to_string())
        })?;

    let event = state.webhooks.verify_event(&body, signature).map_err(|e| {
        tracing::warn!(error = %e, "Stripe webhook signature verification failed");
        ApiError::BadRequest("Invalid webhook signature".to_string())
    })?;

    tracing::info!(
        event_id = %event.id,
        event_type = %event.event_type,
        "Stripe webhook event verified"
    );

    state.webhooks.handle_event(event).await?;

    Ok(StatusCode::OK)
}
