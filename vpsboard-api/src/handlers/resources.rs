use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use vpsboard_common::{
    CapacityLedger, LedgerOverview, ReconcileReport, ResourceStats, UpdateResourcesRequest,
};

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::errors::error_response;

#[utoipa::path(
    get,
    path = "/api/resources",
    tag = "resources",
    responses((status = 200, body = LedgerOverview))
)]
pub async fn get_resources(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Response {
    match state.ledger.current(&user.identity()).await {
        Ok(overview) => Json(overview).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    get,
    path = "/api/resources/stats",
    tag = "resources",
    responses(
        (status = 200, body = ResourceStats),
        (status = 404, description = "No resource information found")
    )
)]
pub async fn get_resource_stats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Response {
    match state.ledger.stats(&user.identity()).await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    put,
    path = "/api/resources/update",
    tag = "resources",
    request_body = UpdateResourcesRequest,
    responses(
        (status = 200, body = CapacityLedger),
        (status = 400, description = "Totals out of bounds"),
        (status = 403, description = "Admin access required")
    )
)]
pub async fn update_resources(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<UpdateResourcesRequest>,
) -> Response {
    match state.ledger.update(&user.identity(), &req).await {
        Ok(ledger) => Json(ledger).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    put,
    path = "/api/resources/auto-update",
    tag = "resources",
    responses(
        (status = 200, body = ReconcileReport),
        (status = 403, description = "Admin access required"),
        (status = 409, description = "No resource configuration found")
    )
)]
pub async fn auto_update_resources(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Response {
    match state.ledger.reconcile(&user.identity()).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(e),
    }
}
