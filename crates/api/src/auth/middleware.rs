//! Request authentication middleware

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::auth::JwtManager;
use crate::error::ApiError;

/// State subset the auth middleware needs
#[derive(Clone)]
pub struct AuthState {
    pub jwt: JwtManager,
}

/// Authenticated user attached to the request by `require_auth`
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
}

/// Middleware requiring a valid access token.
///
/// Accepts `Authorization: Bearer <token>` or a `token` cookie (the browser
/// client stores the session token in a cookie). Failures are a uniform 401
/// so callers can't probe which check failed.
pub async fn require_auth(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(&request).ok_or(ApiError::Unauthorized)?;

    let claims = state
        .jwt
        .validate_access_token(&token)
        .map_err(|e| {
            tracing::debug!(error = %e, "Access token rejected");
            ApiError::Unauthorized
        })?;

    request.extensions_mut().insert(AuthUser {
        id: claims.sub,
        email: claims.email,
    });

    Ok(next.run(request).await)
}

fn extract_token(request: &Request) -> Option<String> {
    if let Some(value) = request.headers().get(header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    // Fall back to the session cookie
    let cookies = request.headers().get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == "token").then(|| value.to_string())
    })
}

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(ApiError::Unauthorized)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with_header(name: header::HeaderName, value: &str) -> Request {
        Request::builder()
            .header(name, value)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_extract_bearer_token() {
        let req = request_with_header(header::AUTHORIZATION, "Bearer abc.def.ghi");
        assert_eq!(extract_token(&req).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_extract_cookie_token() {
        let req = request_with_header(header::COOKIE, "theme=dark; token=abc.def.ghi; lang=en");
        assert_eq!(extract_token(&req).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_missing_token() {
        let req = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(extract_token(&req), None);

        let req = request_with_header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz");
        assert_eq!(extract_token(&req), None);
    }
}
