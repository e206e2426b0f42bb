use utoipa::OpenApi;
use vpsboard_common::{
    AuditEntry, AuditListing, AuditStats, CapacityLedger, ChangePasswordRequest,
    CreateInstanceRequest, CreateSnapshotRequest, Instance, InstanceAuditListing, InstanceStatus,
    LedgerOverview, LoginRequest, Page, Principal, PrincipalAuditListing, ReconcileReport,
    RegisterRequest, ResourceStats, Role, Snapshot, UpdateInstanceRequest, UpdatePrincipalRequest,
    UpdateResourcesRequest,
};

use crate::handlers::{dashboard, instances, logs, resources, snapshots};
use crate::routes::public;
use crate::{auth_endpoints, users_endpoint};

#[derive(OpenApi)]
#[openapi(
    paths(
        public::health,
        // Auth
        auth_endpoints::register,
        auth_endpoints::login,
        auth_endpoints::profile,
        auth_endpoints::change_password,
        // Users
        users_endpoint::list_users,
        users_endpoint::get_user,
        users_endpoint::update_user,
        users_endpoint::delete_user,
        // Instances
        instances::list_instances,
        instances::create_instance,
        instances::get_instance,
        instances::update_instance,
        instances::delete_instance,
        instances::start_instance,
        instances::stop_instance,
        instances::restart_instance,
        // Snapshots
        snapshots::create_snapshot,
        snapshots::list_instance_snapshots,
        snapshots::list_all_snapshots,
        snapshots::get_snapshot,
        snapshots::delete_snapshot,
        snapshots::restore_snapshot,
        // Resources
        resources::get_resources,
        resources::get_resource_stats,
        resources::update_resources,
        resources::auto_update_resources,
        // Logs
        logs::list_logs,
        logs::get_log_stats,
        logs::get_instance_logs,
        logs::get_user_logs,
        // Dashboard
        dashboard::get_dashboard_stats
    ),
    components(
        schemas(
            Principal,
            Role,
            Instance,
            InstanceStatus,
            Snapshot,
            CapacityLedger,
            AuditEntry,
            // Requests
            RegisterRequest,
            LoginRequest,
            ChangePasswordRequest,
            UpdatePrincipalRequest,
            CreateInstanceRequest,
            UpdateInstanceRequest,
            CreateSnapshotRequest,
            UpdateResourcesRequest,
            // Responses
            Page<Instance>,
            Page<Snapshot>,
            Page<Principal>,
            Page<AuditEntry>,
            LedgerOverview,
            ResourceStats,
            ReconcileReport,
            AuditListing,
            InstanceAuditListing,
            PrincipalAuditListing,
            AuditStats,
            instances::InstanceMutationResponse,
            instances::DeleteInstanceResponse,
            snapshots::SnapshotDetail,
            dashboard::DashboardStats
        )
    ),
    tags(
        (name = "health", description = "Liveness probe"),
        (name = "auth", description = "Registration, login and profile"),
        (name = "users", description = "User administration"),
        (name = "instances", description = "Instance lifecycle and inventory"),
        (name = "snapshots", description = "Point-in-time instance snapshots"),
        (name = "resources", description = "Capacity pool and usage reconciliation"),
        (name = "logs", description = "Activity log queries and statistics"),
        (name = "dashboard", description = "Aggregated platform counters")
    )
)]
pub struct ApiDoc;
