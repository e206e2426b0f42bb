use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Serialize;
use vpsboard_core::store::AuditFilter;

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::errors::error_response;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DashboardStats {
    pub total_users: i64,
    pub total_instances: i64,
    pub total_logs: i64,
    pub total_resources: i64,
}

#[utoipa::path(
    get,
    path = "/api/dashboard/stats",
    tag = "dashboard",
    responses((status = 200, body = DashboardStats))
)]
pub async fn get_dashboard_stats(
    State(state): State<Arc<AppState>>,
    Extension(_user): Extension<AuthUser>,
) -> Response {
    let total_users = match state.store.count_principals().await {
        Ok(count) => count,
        Err(e) => return error_response(e),
    };
    let total_instances = match state.store.count_instances(None).await {
        Ok(count) => count,
        Err(e) => return error_response(e),
    };
    let total_logs = match state.store.count_audit(&AuditFilter::default()).await {
        Ok(count) => count,
        Err(e) => return error_response(e),
    };
    let total_resources = match state.store.count_ledger_rows().await {
        Ok(count) => count,
        Err(e) => return error_response(e),
    };
    Json(DashboardStats {
        total_users,
        total_instances,
        total_logs,
        total_resources,
    })
    .into_response()
}
