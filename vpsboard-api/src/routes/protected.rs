use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;

use crate::app::AppState;
use crate::handlers::{dashboard, instances, logs, resources, snapshots};
use crate::{auth, auth_endpoints, users_endpoint};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/auth/profile", get(auth_endpoints::profile))
        .route("/api/users", get(users_endpoint::list_users))
        .route(
            "/api/users/change-password",
            put(auth_endpoints::change_password),
        )
        .route(
            "/api/users/{id}",
            get(users_endpoint::get_user)
                .put(users_endpoint::update_user)
                .delete(users_endpoint::delete_user),
        )
        .route("/api/instances", get(instances::list_instances))
        .route("/api/instances/create", post(instances::create_instance))
        .route(
            "/api/instances/{id}",
            get(instances::get_instance)
                .put(instances::update_instance)
                .delete(instances::delete_instance),
        )
        .route("/api/instances/{id}/start", put(instances::start_instance))
        .route("/api/instances/{id}/stop", put(instances::stop_instance))
        .route(
            "/api/instances/{id}/restart",
            put(instances::restart_instance),
        )
        .route(
            "/api/instances/{id}/snapshot",
            post(snapshots::create_snapshot),
        )
        .route(
            "/api/instances/{id}/snapshots",
            get(snapshots::list_instance_snapshots),
        )
        .route("/api/snapshots/all", get(snapshots::list_all_snapshots))
        .route(
            "/api/snapshots/{id}",
            get(snapshots::get_snapshot).delete(snapshots::delete_snapshot),
        )
        .route(
            "/api/snapshots/{id}/restore",
            put(snapshots::restore_snapshot),
        )
        .route("/api/resources", get(resources::get_resources))
        .route("/api/resources/stats", get(resources::get_resource_stats))
        .route("/api/resources/update", put(resources::update_resources))
        .route(
            "/api/resources/auto-update",
            put(resources::auto_update_resources),
        )
        .route("/api/logs", get(logs::list_logs))
        .route("/api/logs/stats", get(logs::get_log_stats))
        .route("/api/logs/instance/{id}", get(logs::get_instance_logs))
        .route("/api/logs/user/{id}", get(logs::get_user_logs))
        .route("/api/dashboard/stats", get(dashboard::get_dashboard_stats))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_user,
        ))
        .with_state(state)
}
