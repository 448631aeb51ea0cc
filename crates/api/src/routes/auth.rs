//! Credential auth: register, login, token refresh, current user

use axum::{extract::State, Json};
use quill_shared::User;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::{hash_password, validate_password, verify_password, AuthUser};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub created_at: OffsetDateTime,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub user: UserResponse,
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let email = body.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::Validation("Invalid email address".to_string()));
    }
    validate_password(&body.password).map_err(|e| ApiError::Validation(e.to_string()))?;

    if state.store.user_by_email(&email).await?.is_some() {
        return Err(ApiError::EmailAlreadyExists);
    }

    let password_hash =
        hash_password(&body.password).map_err(|e| {
            tracing::error!(error = %e, "Password hashing failed");
            ApiError::Internal
        })?;

    let user = state.store.create_user(&email, &password_hash).await?;

    // Every account starts on the free plan with a zero balance
    state.subscriptions.initialize_free(user.id).await?;

    tracing::info!(user_id = %user.id, "User registered");
    issue_tokens(&state, user)
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let email = body.email.trim().to_lowercase();

    let user = state
        .store
        .user_by_email(&email)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    // OAuth-provisioned accounts have no password hash; same 401 either way
    let hash = user
        .password_hash
        .as_deref()
        .ok_or(ApiError::InvalidCredentials)?;

    let valid = verify_password(&body.password, hash).map_err(|e| {
        tracing::error!(error = %e, "Password verification failed");
        ApiError::Internal
    })?;
    if !valid {
        return Err(ApiError::InvalidCredentials);
    }

    issue_tokens(&state, user)
}

/// POST /api/auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let claims = state
        .jwt
        .validate_refresh_token(&body.refresh_token)
        .map_err(|_| ApiError::Unauthorized)?;

    let user = state
        .store
        .user_by_id(claims.sub)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    issue_tokens(&state, user)
}

/// GET /api/auth/me
pub async fn me(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<UserResponse>> {
    let user = state
        .store
        .user_by_id(user.id)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(user.into()))
}

fn issue_tokens(state: &AppState, user: User) -> ApiResult<Json<TokenResponse>> {
    let access_token = state
        .jwt
        .generate_access_token(user.id, &user.email)
        .map_err(|e| {
            tracing::error!(error = %e, "Token generation failed");
            ApiError::Internal
        })?;
    let refresh_token = state
        .jwt
        .generate_refresh_token(user.id, &user.email)
        .map_err(|e| {
            tracing::error!(error = %e, "Token generation failed");
            ApiError::Internal
        })?;

    Ok(Json(TokenResponse {
        access_token,
        refresh_token,
        expires_in: state.jwt.access_token_expiry_seconds(),
        user: user.into(),
    }))
}
