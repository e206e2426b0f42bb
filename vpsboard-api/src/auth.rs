use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;
use vpsboard_common::{Error, Principal, Role};
use vpsboard_core::policy::Identity;

use crate::app::AppState;
use crate::errors::error_response;

/// Verified caller attached to the request by [`require_user`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    pub fn from_principal(principal: &Principal) -> Self {
        AuthUser {
            id: principal.id,
            username: principal.username.clone(),
            email: principal.email.clone(),
            role: principal.role,
        }
    }

    pub fn identity(&self) -> Identity {
        Identity::new(self.id, self.role)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    pub username: String,
    pub email: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

pub fn jwt_secret() -> String {
    std::env::var("JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".to_string())
}

pub fn jwt_issuer() -> String {
    std::env::var("JWT_ISSUER").unwrap_or_else(|_| "vpsboard".to_string())
}

pub fn jwt_ttl_seconds() -> i64 {
    std::env::var("JWT_TTL_SECONDS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(7 * 24 * 3600)
}

pub fn sign_token(user: &AuthUser) -> anyhow::Result<String> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        iss: jwt_issuer(),
        sub: user.id.to_string(),
        username: user.username.clone(),
        email: user.email.clone(),
        role: user.role.as_str().to_string(),
        iat: now,
        exp: now + jwt_ttl_seconds(),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt_secret().as_bytes()),
    )?;
    Ok(token)
}

pub fn decode_token(token: &str) -> anyhow::Result<Claims> {
    let mut validation = Validation::default();
    validation.set_issuer(&[jwt_issuer()]);
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret().as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

pub fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|t| t.to_string())
}

/// Protected-route middleware: verifies the bearer token and re-checks that
/// the account behind it still exists before attaching [`AuthUser`].
pub async fn require_user(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_bearer(req.headers()) else {
        return error_response(Error::Unauthenticated(
            "Missing bearer token".to_string(),
        ));
    };
    let claims = match decode_token(&token) {
        Ok(claims) => claims,
        Err(_) => {
            return error_response(Error::Unauthenticated(
                "Invalid or expired token".to_string(),
            ))
        }
    };
    let Ok(principal_id) = Uuid::parse_str(&claims.sub) else {
        return error_response(Error::Unauthenticated("Invalid token subject".to_string()));
    };
    let principal = match state.store.principal_by_id(principal_id).await {
        Ok(Some(principal)) => principal,
        Ok(None) => {
            return error_response(Error::Unauthenticated(
                "Account no longer exists".to_string(),
            ))
        }
        Err(e) => return error_response(e),
    };

    req.extensions_mut()
        .insert(AuthUser::from_principal(&principal));
    next.run(req).await
}

pub fn require_admin(user: &AuthUser) -> Result<(), (StatusCode, Json<Value>)> {
    if user.role == Role::Admin {
        Ok(())
    } else {
        Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "forbidden", "message": "Admin access required" })),
        ))
    }
}
