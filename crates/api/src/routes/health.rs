//! Health and readiness probes

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
    /// Whether any premium price IDs are configured for checkout
    pub billing: &'static str,
    /// Number of chat models exposed through the model map
    pub models: usize,
}

/// GET /health — component-level status for dashboards.
/// The database decides the overall verdict; billing configuration is
/// reported but never fails the check (checkout degrades, chat does not).
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database_ok = database_reachable(&state).await;
    let (status, code) = overall_status(database_ok);

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            database: if database_ok { "reachable" } else { "unreachable" },
            billing: billing_status(&state.stripe.config().premium_price_ids),
            models: state.config.model_map.entries().len(),
        }),
    )
}

/// GET /health/live — the process is up and serving
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health/ready — ready to take chat traffic
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    overall_status(database_reachable(&state).await).1
}

async fn database_reachable(state: &AppState) -> bool {
    sqlx::query("SELECT 1").execute(&state.pool).await.is_ok()
}

fn overall_status(database_ok: bool) -> (&'static str, StatusCode) {
    if database_ok {
        ("healthy", StatusCode::OK)
    } else {
        ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
    }
}

fn billing_status(premium_price_ids: &[String]) -> &'static str {
    if premium_price_ids.is_empty() {
        "unconfigured"
    } else {
        "configured"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overall_status_follows_database() {
        assert_eq!(overall_status(true), ("healthy", StatusCode::OK));
        assert_eq!(
            overall_status(false),
            ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
        );
    }

    #[test]
    fn test_billing_status_reflects_price_config() {
        assert_eq!(billing_status(&[]), "unconfigured");
        assert_eq!(billing_status(&["price_1".to_string()]), "configured");
    }
}
