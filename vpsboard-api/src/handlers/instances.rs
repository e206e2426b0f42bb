use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Serialize;
use uuid::Uuid;
use vpsboard_common::{CreateInstanceRequest, Instance, Page, PageParams, UpdateInstanceRequest};
use vpsboard_core::registry::MutationOutcome;

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::errors::error_response;

/// Mutation body: the refreshed instance, plus a warning when the
/// follow-up capacity reconcile failed while the mutation itself stuck.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct InstanceMutationResponse {
    pub instance: Instance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl From<MutationOutcome> for InstanceMutationResponse {
    fn from(outcome: MutationOutcome) -> Self {
        InstanceMutationResponse {
            instance: outcome.instance,
            warning: outcome.warning,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DeleteInstanceResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/instances",
    tag = "instances",
    params(PageParams),
    responses((status = 200, body = Page<Instance>))
)]
pub async fn list_instances(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<PageParams>,
) -> Response {
    match state.registry.list(&user.identity(), &params).await {
        Ok(page) => Json(page).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    post,
    path = "/api/instances/create",
    tag = "instances",
    request_body = CreateInstanceRequest,
    responses(
        (status = 201, body = InstanceMutationResponse),
        (status = 400, description = "Sizing out of range"),
        (status = 409, description = "Address already in use")
    )
)]
pub async fn create_instance(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateInstanceRequest>,
) -> Response {
    match state.registry.create(&user.identity(), &req).await {
        Ok(outcome) => (
            StatusCode::CREATED,
            Json(InstanceMutationResponse::from(outcome)),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    get,
    path = "/api/instances/{id}",
    tag = "instances",
    params(("id" = Uuid, Path, description = "Instance id")),
    responses(
        (status = 200, body = Instance),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Instance not found")
    )
)]
pub async fn get_instance(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.registry.get(&user.identity(), id).await {
        Ok(instance) => Json(instance).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    put,
    path = "/api/instances/{id}",
    tag = "instances",
    params(("id" = Uuid, Path, description = "Instance id")),
    request_body = UpdateInstanceRequest,
    responses(
        (status = 200, body = InstanceMutationResponse),
        (status = 400, description = "Sizing out of range"),
        (status = 404, description = "Instance not found")
    )
)]
pub async fn update_instance(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateInstanceRequest>,
) -> Response {
    match state.registry.update(&user.identity(), id, &req).await {
        Ok(outcome) => Json(InstanceMutationResponse::from(outcome)).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    delete,
    path = "/api/instances/{id}",
    tag = "instances",
    params(("id" = Uuid, Path, description = "Instance id")),
    responses(
        (status = 200, body = DeleteInstanceResponse),
        (status = 404, description = "Instance not found")
    )
)]
pub async fn delete_instance(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.registry.delete(&user.identity(), id).await {
        Ok(warning) => Json(DeleteInstanceResponse {
            message: "Instance deleted successfully".to_string(),
            warning,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    put,
    path = "/api/instances/{id}/start",
    tag = "instances",
    params(("id" = Uuid, Path, description = "Instance id")),
    responses(
        (status = 200, body = InstanceMutationResponse),
        (status = 409, description = "Already running")
    )
)]
pub async fn start_instance(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.registry.start(&user.identity(), id).await {
        Ok(outcome) => Json(InstanceMutationResponse::from(outcome)).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    put,
    path = "/api/instances/{id}/stop",
    tag = "instances",
    params(("id" = Uuid, Path, description = "Instance id")),
    responses(
        (status = 200, body = InstanceMutationResponse),
        (status = 409, description = "Already stopped")
    )
)]
pub async fn stop_instance(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.registry.stop(&user.identity(), id).await {
        Ok(outcome) => Json(InstanceMutationResponse::from(outcome)).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    put,
    path = "/api/instances/{id}/restart",
    tag = "instances",
    params(("id" = Uuid, Path, description = "Instance id")),
    responses(
        (status = 200, body = InstanceMutationResponse),
        (status = 409, description = "Not running")
    )
)]
pub async fn restart_instance(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.registry.restart(&user.identity(), id).await {
        Ok(outcome) => Json(InstanceMutationResponse::from(outcome)).into_response(),
        Err(e) => error_response(e),
    }
}
