//! API routes

pub mod auth;
pub mod chat;
pub mod document;
pub mod health;
pub mod history;
pub mod subscription;
pub mod vote;
pub mod webhook;

use axum::{
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{auth::require_auth, state::AppState};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Public API routes (no auth required)
    let public_api_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        // Stripe webhook (public, protected by signature verification)
        .route("/webhook", post(webhook::stripe_webhook))
        .route("/webhook/stripe", post(webhook::stripe_webhook));

    // Protected API routes (auth required)
    let protected_api_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/chat", post(chat::post_chat))
        .route("/chat", delete(chat::delete_chat))
        .route("/chat/:id/messages", get(chat::get_chat_messages))
        .route("/history", get(history::get_history))
        .route("/vote", get(vote::get_votes))
        .route("/vote", patch(vote::patch_vote))
        .route("/document", get(document::get_document))
        .route("/document", post(document::save_document))
        .route("/subscription", get(subscription::get_subscription))
        .route("/subscription", post(subscription::create_checkout))
        .route("/subscription/update", post(subscription::update_subscription))
        .route("/subscription/fix", post(subscription::fix_subscription))
        .layer(middleware::from_fn_with_state(auth_state, require_auth));

    let api_routes = Router::new()
        .merge(public_api_routes)
        .merge(protected_api_routes);

    Router::new()
        .merge(health_routes)
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
