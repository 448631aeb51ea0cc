//! JWT token generation and validation

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// JWT claims for Quill-issued tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Email
    pub email: String,
    /// Issued at
    pub iat: i64,
    /// Expiration
    pub exp: i64,
    /// Token type (access or refresh)
    pub token_type: TokenType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT manager for token operations
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expiry_hours: i64,
    refresh_token_expiry_days: i64,
}

impl JwtManager {
    pub fn new(secret: &str, access_token_expiry_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_token_expiry_hours,
            refresh_token_expiry_days: 30,
        }
    }

    /// Generate an access token
    pub fn generate_access_token(&self, user_id: Uuid, email: &str) -> Result<String, JwtError> {
        self.generate(user_id, email, TokenType::Access)
    }

    /// Generate a refresh token
    pub fn generate_refresh_token(&self, user_id: Uuid, email: &str) -> Result<String, JwtError> {
        self.generate(user_id, email, TokenType::Refresh)
    }

    fn generate(
        &self,
        user_id: Uuid,
        email: &str,
        token_type: TokenType,
    ) -> Result<String, JwtError> {
        let now = OffsetDateTime::now_utc();
        let exp = match token_type {
            TokenType::Access => now + Duration::hours(self.access_token_expiry_hours),
            TokenType::Refresh => now + Duration::days(self.refresh_token_expiry_days),
        };

        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
            token_type,
        };

        // Explicit algorithm prevents algorithm confusion attacks
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| JwtError::Encoding(e.to_string()))
    }

    /// Validate and decode a token
    pub fn validate_token(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 60; // 60 second clock skew tolerance

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidToken => JwtError::Invalid,
                jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => JwtError::Invalid,
                _ => JwtError::Validation(e.to_string()),
            })
    }

    /// Validate an access token specifically
    pub fn validate_access_token(&self, token: &str) -> Result<Claims, JwtError> {
        let claims = self.validate_token(token)?;
        if claims.token_type != TokenType::Access {
            return Err(JwtError::WrongTokenType);
        }
        Ok(claims)
    }

    /// Validate a refresh token specifically
    pub fn validate_refresh_token(&self, token: &str) -> Result<Claims, JwtError> {
        let claims = self.validate_token(token)?;
        if claims.token_type != TokenType::Refresh {
            return Err(JwtError::WrongTokenType);
        }
        Ok(claims)
    }

    /// Access token expiry in seconds
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_hours * 3600
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
    #[error("Wrong token type")]
    WrongTokenType,
    #[error("Token encoding failed: {0}")]
    Encoding(String),
    #[error("Token validation failed: {0}")]
    Validation(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_token_generation_and_validation() {
        let jwt = JwtManager::new("test-secret-key-at-least-32-chars!", 24);
        let user_id = Uuid::new_v4();

        let access = jwt
            .generate_access_token(user_id, "test@example.com")
            .expect("Failed to generate token");
        let refresh = jwt
            .generate_refresh_token(user_id, "test@example.com")
            .expect("Failed to generate token");

        let claims = jwt.validate_access_token(&access).expect("Invalid token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email, "test@example.com");
        assert_eq!(claims.token_type, TokenType::Access);

        let claims = jwt.validate_refresh_token(&refresh).expect("Invalid token");
        assert_eq!(claims.token_type, TokenType::Refresh);
    }

    #[test]
    fn test_wrong_token_type() {
        let jwt = JwtManager::new("test-secret-key-at-least-32-chars!", 24);
        let access = jwt
            .generate_access_token(Uuid::new_v4(), "test@example.com")
            .expect("Failed to generate token");

        // Using access token as refresh should fail
        assert!(matches!(
            jwt.validate_refresh_token(&access),
            Err(JwtError::WrongTokenType)
        ));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let jwt = JwtManager::new("test-secret-key-at-least-32-chars!", 24);
        let other = JwtManager::new("another-secret-key-at-least-32-ch!", 24);

        let token = jwt
            .generate_access_token(Uuid::new_v4(), "test@example.com")
            .expect("Failed to generate token");

        assert!(other.validate_access_token(&token).is_err());
    }
}
