use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use vpsboard_common::{
    AuditListing, AuditStats, InstanceAuditListing, PageParams, PrincipalAuditListing,
};
use vpsboard_core::audit::AuditQuery;

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::errors::error_response;

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct AuditListParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    /// Case-insensitive substring match on the action tag.
    pub action: Option<String>,
    pub instance_id: Option<Uuid>,
    /// Honored for admins only.
    pub principal_id: Option<Uuid>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl AuditListParams {
    fn page_params(&self) -> PageParams {
        PageParams {
            page: self.page,
            limit: self.limit,
        }
    }

    fn query(&self) -> AuditQuery {
        AuditQuery {
            action: self.action.clone(),
            instance_id: self.instance_id,
            principal_id: self.principal_id,
            from: self.start_date,
            to: self.end_date,
        }
    }
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct TrailParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub action: Option<String>,
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct StatsParams {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[utoipa::path(
    get,
    path = "/api/logs",
    tag = "logs",
    params(AuditListParams),
    responses((status = 200, body = AuditListing))
)]
pub async fn list_logs(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<AuditListParams>,
) -> Response {
    match state
        .audit
        .list(&user.identity(), &params.query(), &params.page_params())
        .await
    {
        Ok(listing) => Json(listing).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    get,
    path = "/api/logs/stats",
    tag = "logs",
    params(StatsParams),
    responses((status = 200, body = AuditStats))
)]
pub async fn get_log_stats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<StatsParams>,
) -> Response {
    match state
        .audit
        .stats(&user.identity(), params.start_date, params.end_date)
        .await
    {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    get,
    path = "/api/logs/instance/{id}",
    tag = "logs",
    params(("id" = Uuid, Path, description = "Instance id"), TrailParams),
    responses(
        (status = 200, body = InstanceAuditListing),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Instance not found")
    )
)]
pub async fn get_instance_logs(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Query(params): Query<TrailParams>,
) -> Response {
    let page_params = PageParams {
        page: params.page,
        limit: params.limit,
    };
    match state
        .audit
        .instance_trail(&user.identity(), id, params.action, &page_params)
        .await
    {
        Ok(listing) => Json(listing).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    get,
    path = "/api/logs/user/{id}",
    tag = "logs",
    params(("id" = Uuid, Path, description = "Principal id"), TrailParams),
    responses(
        (status = 200, body = PrincipalAuditListing),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user_logs(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Query(params): Query<TrailParams>,
) -> Response {
    let page_params = PageParams {
        page: params.page,
        limit: params.limit,
    };
    match state
        .audit
        .principal_trail(&user.identity(), id, params.action, &page_params)
        .await
    {
        Ok(listing) => Json(listing).into_response(),
        Err(e) => error_response(e),
    }
}
