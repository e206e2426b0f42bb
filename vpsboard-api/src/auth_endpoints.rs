use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;
use vpsboard_common::{
    limits, ChangePasswordRequest, Error, LoginRequest, Principal, RegisterRequest, Role,
};

use crate::app::AppState;
use crate::auth::{sign_token, AuthUser};
use crate::errors::error_response;

pub(crate) fn validate_username(username: &str) -> Result<(), Error> {
    let name = username.trim();
    if name.len() < limits::USERNAME_MIN || name.len() > limits::USERNAME_MAX {
        return Err(Error::InvalidRange(
            "Username must be between 3 and 50 characters".to_string(),
        ));
    }
    Ok(())
}

/// Normalizes the email to lowercase, rejecting obviously malformed input.
pub(crate) fn validate_email(email: &str) -> Result<String, Error> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(Error::InvalidRange(
            "Please provide a valid email".to_string(),
        ));
    }
    Ok(email)
}

fn validate_password(password: &str) -> Result<(), Error> {
    if password.len() < limits::PASSWORD_MIN {
        return Err(Error::InvalidRange(
            "Password must be at least 6 characters long".to_string(),
        ));
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, token issued"),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Username or email already registered")
    )
)]
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Response {
    if let Err(e) = validate_username(&req.username) {
        return error_response(e);
    }
    let email = match validate_email(&req.email) {
        Ok(email) => email,
        Err(e) => return error_response(e),
    };
    if let Err(e) = validate_password(&req.password) {
        return error_response(e);
    }

    match state
        .store
        .identity_taken(req.username.trim(), &email, None)
        .await
    {
        Ok(false) => {}
        Ok(true) => {
            return error_response(Error::DuplicateIdentity(
                "User with this email or username already exists".to_string(),
            ))
        }
        Err(e) => return error_response(e),
    }

    let password_hash = match bcrypt::hash(&req.password, bcrypt::DEFAULT_COST) {
        Ok(hash) => hash,
        Err(e) => return error_response(Error::internal(e.to_string())),
    };
    let now = Utc::now();
    let principal = Principal {
        id: Uuid::new_v4(),
        username: req.username.trim().to_string(),
        email,
        password_hash,
        role: req.role.unwrap_or(Role::User),
        created_at: now,
        updated_at: now,
    };
    if let Err(e) = state.store.insert_principal(&principal).await {
        return error_response(e);
    }

    match sign_token(&AuthUser::from_principal(&principal)) {
        Ok(token) => (
            StatusCode::CREATED,
            Json(json!({ "token": token, "user": principal })),
        )
            .into_response(),
        Err(e) => error_response(Error::internal(e.to_string())),
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued"),
        (status = 401, description = "Unknown email or wrong password")
    )
)]
pub async fn login(State(state): State<Arc<AppState>>, Json(req): Json<LoginRequest>) -> Response {
    let email = req.email.trim().to_lowercase();
    let principal = match state.store.principal_by_email(&email).await {
        Ok(Some(principal)) => principal,
        // Same answer for unknown email and wrong password.
        Ok(None) => {
            return error_response(Error::Unauthenticated(
                "Invalid email or password".to_string(),
            ))
        }
        Err(e) => return error_response(e),
    };
    if !bcrypt::verify(&req.password, &principal.password_hash).unwrap_or(false) {
        return error_response(Error::Unauthenticated(
            "Invalid email or password".to_string(),
        ));
    }

    match sign_token(&AuthUser::from_principal(&principal)) {
        Ok(token) => Json(json!({ "token": token, "user": principal })).into_response(),
        Err(e) => error_response(Error::internal(e.to_string())),
    }
}

#[utoipa::path(
    get,
    path = "/api/auth/profile",
    tag = "auth",
    responses(
        (status = 200, body = Principal),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Response {
    match state.store.principal_by_id(user.id).await {
        Ok(Some(principal)) => Json(principal).into_response(),
        Ok(None) => error_response(Error::not_found("User")),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    put,
    path = "/api/users/change-password",
    tag = "users",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed"),
        (status = 401, description = "Current password is incorrect")
    )
)]
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<ChangePasswordRequest>,
) -> Response {
    if req.new_password.len() < limits::PASSWORD_MIN {
        return error_response(Error::InvalidRange(
            "New password must be at least 6 characters long".to_string(),
        ));
    }
    let mut principal = match state.store.principal_by_id(user.id).await {
        Ok(Some(principal)) => principal,
        Ok(None) => return error_response(Error::not_found("User")),
        Err(e) => return error_response(e),
    };
    if !bcrypt::verify(&req.current_password, &principal.password_hash).unwrap_or(false) {
        return error_response(Error::Unauthenticated(
            "Current password is incorrect".to_string(),
        ));
    }

    principal.password_hash = match bcrypt::hash(&req.new_password, bcrypt::DEFAULT_COST) {
        Ok(hash) => hash,
        Err(e) => return error_response(Error::internal(e.to_string())),
    };
    principal.updated_at = Utc::now();
    if let Err(e) = state.store.update_principal(&principal).await {
        return error_response(e);
    }
    Json(json!({ "message": "Password changed successfully" })).into_response()
}
