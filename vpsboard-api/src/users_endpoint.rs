use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;
use vpsboard_common::{Error, Page, PageParams, Principal, UpdatePrincipalRequest};
use vpsboard_core::policy::{decide, Decision, PolicyAction, PolicyTarget};

use crate::app::AppState;
use crate::auth::{require_admin, AuthUser};
use crate::auth_endpoints::{validate_email, validate_username};
use crate::errors::error_response;

#[utoipa::path(
    get,
    path = "/api/users",
    tag = "users",
    params(PageParams),
    responses(
        (status = 200, body = Page<Principal>),
        (status = 403, description = "Admin access required")
    )
)]
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<PageParams>,
) -> Response {
    if let Err(e) = require_admin(&user) {
        return e.into_response();
    }
    let rows = match state
        .store
        .list_principals(params.offset(), params.limit())
        .await
    {
        Ok(rows) => rows,
        Err(e) => return error_response(e),
    };
    match state.store.count_principals().await {
        Ok(total) => Json(Page::new(rows, total, &params)).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    get,
    path = "/api/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "Principal id")),
    responses(
        (status = 200, body = Principal),
        (status = 403, description = "Not your profile"),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Response {
    let principal = match state.store.principal_by_id(id).await {
        Ok(Some(principal)) => principal,
        Ok(None) => return error_response(Error::not_found("User")),
        Err(e) => return error_response(e),
    };
    let target = PolicyTarget::Principal { id };
    if decide(&user.identity(), PolicyAction::View, &target) == Decision::Deny {
        return error_response(Error::Forbidden(
            "You can only view your own profile".to_string(),
        ));
    }
    Json(principal).into_response()
}

#[utoipa::path(
    put,
    path = "/api/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "Principal id")),
    request_body = UpdatePrincipalRequest,
    responses(
        (status = 200, body = Principal),
        (status = 403, description = "Not your profile, or role change without admin"),
        (status = 404, description = "User not found"),
        (status = 409, description = "Username or email already taken")
    )
)]
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdatePrincipalRequest>,
) -> Response {
    let mut principal = match state.store.principal_by_id(id).await {
        Ok(Some(principal)) => principal,
        Ok(None) => return error_response(Error::not_found("User")),
        Err(e) => return error_response(e),
    };
    let who = user.identity();
    let target = PolicyTarget::Principal { id };
    if decide(&who, PolicyAction::Mutate, &target) == Decision::Deny {
        return error_response(Error::Forbidden(
            "You can only update your own profile".to_string(),
        ));
    }

    if let Some(username) = &req.username {
        if let Err(e) = validate_username(username) {
            return error_response(e);
        }
        match state.store.principal_by_username(username.trim()).await {
            Ok(Some(existing)) if existing.id != principal.id => {
                return error_response(Error::DuplicateIdentity(
                    "Username already exists".to_string(),
                ))
            }
            Ok(_) => {}
            Err(e) => return error_response(e),
        }
        principal.username = username.trim().to_string();
    }
    if let Some(email) = &req.email {
        let email = match validate_email(email) {
            Ok(email) => email,
            Err(e) => return error_response(e),
        };
        match state.store.principal_by_email(&email).await {
            Ok(Some(existing)) if existing.id != principal.id => {
                return error_response(Error::DuplicateIdentity(
                    "Email already exists".to_string(),
                ))
            }
            Ok(_) => {}
            Err(e) => return error_response(e),
        }
        principal.email = email;
    }
    if let Some(role) = req.role {
        if role != principal.role {
            if decide(&who, PolicyAction::ChangeRole, &target) == Decision::Deny {
                return error_response(Error::Forbidden(
                    "Only admins can change user roles".to_string(),
                ));
            }
            principal.role = role;
        }
    }

    principal.updated_at = Utc::now();
    match state.store.update_principal(&principal).await {
        Ok(()) => Json(principal).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "Principal id")),
    responses(
        (status = 200, description = "User deleted"),
        (status = 403, description = "Not your account, or admin self-delete"),
        (status = 404, description = "User not found")
    )
)]
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.store.principal_by_id(id).await {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(Error::not_found("User")),
        Err(e) => return error_response(e),
    }
    let who = user.identity();
    if decide(&who, PolicyAction::Delete, &PolicyTarget::Principal { id }) == Decision::Deny {
        let message = if who.is_admin() && id == who.principal_id {
            "Admin cannot delete their own account"
        } else {
            "You can only delete your own account"
        };
        return error_response(Error::Forbidden(message.to_string()));
    }

    match state.store.delete_principal(id).await {
        Ok(true) => Json(json!({ "message": "User deleted successfully" })).into_response(),
        Ok(false) => error_response(Error::not_found("User")),
        Err(e) => error_response(e),
    }
}
