use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;
use vpsboard_common::{CreateSnapshotRequest, Instance, Page, PageParams, Snapshot};
use vpsboard_core::snapshots::SnapshotWithInstance;

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::errors::error_response;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SnapshotDetail {
    pub snapshot: Snapshot,
    pub instance: Instance,
}

impl From<SnapshotWithInstance> for SnapshotDetail {
    fn from(found: SnapshotWithInstance) -> Self {
        SnapshotDetail {
            snapshot: found.snapshot,
            instance: found.instance,
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/instances/{id}/snapshot",
    tag = "snapshots",
    params(("id" = Uuid, Path, description = "Instance id")),
    request_body = CreateSnapshotRequest,
    responses(
        (status = 201, body = Snapshot),
        (status = 404, description = "Instance not found"),
        (status = 409, description = "Instance not running")
    )
)]
pub async fn create_snapshot(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateSnapshotRequest>,
) -> Response {
    match state.snapshots.create(&user.identity(), id, &req).await {
        Ok(snapshot) => (StatusCode::CREATED, Json(snapshot)).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    get,
    path = "/api/instances/{id}/snapshots",
    tag = "snapshots",
    params(("id" = Uuid, Path, description = "Instance id"), PageParams),
    responses(
        (status = 200, body = Page<Snapshot>),
        (status = 404, description = "Instance not found")
    )
)]
pub async fn list_instance_snapshots(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Query(params): Query<PageParams>,
) -> Response {
    match state.snapshots.list(&user.identity(), id, &params).await {
        Ok(page) => Json(page).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    get,
    path = "/api/snapshots/all",
    tag = "snapshots",
    params(PageParams),
    responses(
        (status = 200, body = Page<Snapshot>),
        (status = 403, description = "Admin access required")
    )
)]
pub async fn list_all_snapshots(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<PageParams>,
) -> Response {
    match state.snapshots.list_all(&user.identity(), &params).await {
        Ok(page) => Json(page).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    get,
    path = "/api/snapshots/{id}",
    tag = "snapshots",
    params(("id" = Uuid, Path, description = "Snapshot id")),
    responses(
        (status = 200, body = SnapshotDetail),
        (status = 404, description = "Snapshot not found")
    )
)]
pub async fn get_snapshot(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.snapshots.get(&user.identity(), id).await {
        Ok(found) => Json(SnapshotDetail::from(found)).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    delete,
    path = "/api/snapshots/{id}",
    tag = "snapshots",
    params(("id" = Uuid, Path, description = "Snapshot id")),
    responses(
        (status = 200, description = "Snapshot deleted"),
        (status = 404, description = "Snapshot not found")
    )
)]
pub async fn delete_snapshot(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.snapshots.delete(&user.identity(), id).await {
        Ok(()) => Json(json!({ "message": "Snapshot deleted successfully" })).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    put,
    path = "/api/snapshots/{id}/restore",
    tag = "snapshots",
    params(("id" = Uuid, Path, description = "Snapshot id")),
    responses(
        (status = 200, body = SnapshotDetail),
        (status = 404, description = "Snapshot not found"),
        (status = 409, description = "Instance not stopped")
    )
)]
pub async fn restore_snapshot(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.snapshots.restore(&user.identity(), id).await {
        Ok(found) => Json(json!({
            "message": "Instance restored from snapshot successfully",
            "snapshot": found.snapshot,
            "instance": found.instance,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}
