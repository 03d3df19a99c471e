//! Bearer-token authentication for the admin surface. Tokens are HS256 JWTs
//! issued by `POST /admin/token` against the configured shared secret.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use locarank_core::{Error, Result};

use crate::error::ErrorBody;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(rename = "type")]
    pub token_type: String,
}

pub fn create_access_token(client_id: &str, secret: &str, expire_minutes: u64) -> Result<String> {
    let claims = Claims {
        sub: client_id.to_string(),
        exp: (Utc::now() + Duration::minutes(expire_minutes as i64)).timestamp(),
        token_type: "api".to_string(),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| Error::internal(format!("token encoding failed: {e}")))
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| Error::validation(format!("invalid token: {e}")))
}

/// Middleware guarding admin routes: requires `Authorization: Bearer <jwt>`.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match token {
        Some(token) if verify_token(token, &state.config.auth.secret_key).is_ok() => {
            next.run(request).await
        }
        _ => {
            let status = axum::http::StatusCode::UNAUTHORIZED;
            let body = ErrorBody {
                error: "unauthorized".to_string(),
                detail: Some("a valid bearer token is required".to_string()),
                status_code: status.as_u16(),
            };
            (status, axum::Json(body)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies_with_the_same_secret() {
        let token = create_access_token("client-1", "secret", 30).unwrap();
        let claims = verify_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, "client-1");
        assert_eq!(claims.token_type, "api");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = create_access_token("client-1", "secret", 30).unwrap();
        assert!(verify_token(&token, "other").is_err());
    }

    #[test]
    fn garbage_token_is_rejected() {
        assert!(verify_token("not-a-jwt", "secret").is_err());
    }
}
