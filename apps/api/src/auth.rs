//! Request authentication.
//!
//! Users sign in with the hosted auth backend, which issues HS256 JWTs signed with
//! the project's JWT secret. We only verify them; sessions, sign-up and password
//! flows live entirely on the hosted side.

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;

/// Audience the hosted auth backend stamps on user access tokens.
const TOKEN_AUDIENCE: &str = "authenticated";

#[derive(Debug, Deserialize)]
struct Claims {
    sub: Uuid,
    #[allow(dead_code)]
    exp: usize,
    email: Option<String>,
}

/// The authenticated caller, resolved from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(AppError::Unauthorized)?;

        decode_token(token.trim(), &state.config.jwt_secret)
    }
}

/// Verifies signature, expiry and audience, and maps the claims to an `AuthUser`.
pub fn decode_token(token: &str, secret: &str) -> Result<AuthUser, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[TOKEN_AUDIENCE]);

    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|e| {
            tracing::debug!("Rejected bearer token: {e}");
            AppError::Unauthorized
        })?;

    Ok(AuthUser {
        id: data.claims.sub,
        email: data.claims.email,
    })
}

/// Guard for internal endpoints called by the billing integration.
/// Requires `x-service-key` to match `SERVICE_KEY`.
pub struct ServiceKey;

#[async_trait]
impl FromRequestParts<AppState> for ServiceKey {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let expected = state.config.service_key.as_deref().ok_or(AppError::Forbidden)?;
        let provided = parts
            .headers
            .get("x-service-key")
            .and_then(|value| value.to_str().ok())
            .ok_or(AppError::Unauthorized)?;

        if constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
            Ok(ServiceKey)
        } else {
            Err(AppError::Unauthorized)
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "test-secret-with-enough-entropy";

    fn token(claims: serde_json::Value, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn future_exp() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[test]
    fn test_valid_token_yields_user() {
        let user_id = Uuid::new_v4();
        let jwt = token(
            json!({
                "sub": user_id,
                "exp": future_exp(),
                "aud": "authenticated",
                "email": "recruiter@example.com"
            }),
            SECRET,
        );

        let user = decode_token(&jwt, SECRET).unwrap();
        assert_eq!(user.id, user_id);
        assert_eq!(user.email.as_deref(), Some("recruiter@example.com"));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let jwt = token(
            json!({"sub": Uuid::new_v4(), "exp": future_exp(), "aud": "authenticated"}),
            "another-secret",
        );
        assert!(matches!(
            decode_token(&jwt, SECRET),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let jwt = token(
            json!({
                "sub": Uuid::new_v4(),
                "exp": chrono::Utc::now().timestamp() - 3600,
                "aud": "authenticated"
            }),
            SECRET,
        );
        assert!(decode_token(&jwt, SECRET).is_err());
    }

    #[test]
    fn test_anon_audience_is_rejected() {
        let jwt = token(
            json!({"sub": Uuid::new_v4(), "exp": future_exp(), "aud": "anon"}),
            SECRET,
        );
        assert!(decode_token(&jwt, SECRET).is_err());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
