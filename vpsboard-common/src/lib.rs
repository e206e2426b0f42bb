use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

/// Bounds enforced on instance sizing and on the capacity ledger totals.
pub mod limits {
    pub const INSTANCE_CPU_MIN: i32 = 1;
    pub const INSTANCE_CPU_MAX: i32 = 32;
    pub const INSTANCE_RAM_MIN: i32 = 512;
    pub const INSTANCE_RAM_MAX: i32 = 32_768;
    pub const INSTANCE_STORAGE_MIN: i32 = 10;
    pub const INSTANCE_STORAGE_MAX: i32 = 2_048;

    pub const TOTAL_CPU_MIN: i32 = 1;
    pub const TOTAL_CPU_MAX: i32 = 128;
    pub const TOTAL_RAM_MIN: i32 = 1_024;
    pub const TOTAL_RAM_MAX: i32 = 131_072;
    pub const TOTAL_STORAGE_MIN: i32 = 100;
    pub const TOTAL_STORAGE_MAX: i32 = 10_240;

    pub const USERNAME_MIN: usize = 3;
    pub const USERNAME_MAX: usize = 50;
    pub const PASSWORD_MIN: usize = 6;
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, utoipa::ToSchema)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, utoipa::ToSchema)]
#[sqlx(type_name = "instance_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Stopped,
    Running,
    Paused,
    Error,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Stopped => "stopped",
            InstanceStatus::Running => "running",
            InstanceStatus::Paused => "paused",
            InstanceStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<InstanceStatus> {
        match s {
            "stopped" => Some(InstanceStatus::Stopped),
            "running" => Some(InstanceStatus::Running),
            "paused" => Some(InstanceStatus::Paused),
            "error" => Some(InstanceStatus::Error),
            _ => None,
        }
    }
}

/// An account that can authenticate and own instances.
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow, utoipa::ToSchema)]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    #[schema(ignore)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A managed virtual server record.
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow, utoipa::ToSchema)]
pub struct Instance {
    pub id: Uuid,
    pub name: String,
    pub status: InstanceStatus,
    pub cpu: i32,
    pub ram: i32,
    pub storage: i32,
    pub address: String,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A point-in-time restore marker attached to an instance.
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow, utoipa::ToSchema)]
pub struct Snapshot {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// The single fleet-wide capacity row: declared totals and currently used amounts.
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow, utoipa::ToSchema)]
pub struct CapacityLedger {
    pub id: Uuid,
    pub total_cpu: i32,
    pub total_ram: i32,
    pub total_storage: i32,
    pub used_cpu: i32,
    pub used_ram: i32,
    pub used_storage: i32,
    pub last_updated: DateTime<Utc>,
}

impl CapacityLedger {
    /// Starting configuration used when no ledger row exists yet.
    pub fn with_defaults() -> Self {
        CapacityLedger {
            id: Uuid::new_v4(),
            total_cpu: 32,
            total_ram: 32_768,
            total_storage: 1_024,
            used_cpu: 0,
            used_ram: 0,
            used_storage: 0,
            last_updated: Utc::now(),
        }
    }
}

/// Append-only trace of every mutating operation.
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow, utoipa::ToSchema)]
pub struct AuditEntry {
    pub id: Uuid,
    pub action: String,
    pub instance_id: Option<Uuid>,
    pub principal_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub details: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidRange(String),
    #[error("{0}")]
    DuplicateAddress(String),
    #[error("{0}")]
    DuplicateIdentity(String),
    #[error("{0}")]
    InvalidStateTransition(String),
    #[error("{0}")]
    NotConfigured(String),
    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable tag carried in error response bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Unauthenticated(_) => "unauthenticated",
            Error::Forbidden(_) => "forbidden",
            Error::NotFound(_) => "not_found",
            Error::InvalidRange(_) => "invalid_range",
            Error::DuplicateAddress(_) => "duplicate_address",
            Error::DuplicateIdentity(_) => "duplicate_identity",
            Error::InvalidStateTransition(_) => "invalid_state_transition",
            Error::NotConfigured(_) => "not_configured",
            Error::Internal(_) => "internal_error",
        }
    }

    pub fn not_found(what: &str) -> Error {
        Error::NotFound(format!("{what} not found"))
    }

    pub fn internal(message: impl Into<String>) -> Error {
        Error::Internal(message.into())
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Internal(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, utoipa::IntoParams)]
pub struct PageParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageParams {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(20).clamp(1, 100)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.limit()
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub limit: i64,
    pub total_count: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total_count: i64, params: &PageParams) -> Self {
        let page = params.page();
        let limit = params.limit();
        let total_pages = if total_count == 0 {
            0
        } else {
            (total_count + limit - 1) / limit
        };
        Page {
            items,
            page,
            limit,
            total_count,
            total_pages,
            has_next: params.offset() + limit < total_count,
            has_prev: page > 1,
        }
    }
}

// ---- Request payloads ----

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdatePrincipalRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateInstanceRequest {
    pub name: String,
    pub cpu: i32,
    pub ram: i32,
    pub storage: i32,
    pub address: String,
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct UpdateInstanceRequest {
    pub name: Option<String>,
    pub cpu: Option<i32>,
    pub ram: Option<i32>,
    pub storage: Option<i32>,
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct CreateSnapshotRequest {
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct UpdateResourcesRequest {
    pub total_cpu: Option<i32>,
    pub total_ram: Option<i32>,
    pub total_storage: Option<i32>,
    pub used_cpu: Option<i32>,
    pub used_ram: Option<i32>,
    pub used_storage: Option<i32>,
}

// ---- Computed response shapes ----

/// Percent utilization and remaining headroom derived from a ledger row.
/// `available_*` can go negative when running instances exceed declared totals.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct Utilization {
    pub cpu_usage: f64,
    pub ram_usage: f64,
    pub storage_usage: f64,
    pub available_cpu: i32,
    pub available_ram: i32,
    pub available_storage: i32,
}

/// Resource footprint summed over instances currently in the running state.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ActualUsage {
    pub cpu: i64,
    pub ram: i64,
    pub storage: i64,
    pub running_count: i64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct FleetSummary {
    pub total_instances: i64,
    pub running: i64,
    pub stopped: i64,
    pub paused: i64,
    pub error: i64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LedgerOverview {
    pub resource: CapacityLedger,
    pub usage: Utilization,
    pub actual_usage: ActualUsage,
    pub summary: FleetSummary,
}

/// Before/after usage captured by a reconcile pass.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UsageTriple {
    pub cpu: i32,
    pub ram: i32,
    pub storage: i32,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ReconcileReport {
    pub resource: CapacityLedger,
    pub previous_usage: UsageTriple,
    pub new_usage: UsageTriple,
    pub running_count: i64,
}

/// Per-status instance counts and resource sums.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct StatusAggregate {
    pub status: InstanceStatus,
    pub count: i64,
    pub cpu: i64,
    pub ram: i64,
    pub storage: i64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct Efficiency {
    pub cpu_efficiency: f64,
    pub ram_efficiency: f64,
    pub storage_efficiency: f64,
    pub overall_efficiency: f64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct Recommendations {
    pub cpu: String,
    pub ram: String,
    pub storage: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ResourceStats {
    pub resource: CapacityLedger,
    pub usage: Utilization,
    pub by_status: Vec<StatusAggregate>,
    pub efficiency: Efficiency,
    pub recommendations: Recommendations,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ActionCount {
    pub action: String,
    pub count: i64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct InstanceActionCount {
    pub instance_id: Uuid,
    pub count: i64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PrincipalActionCount {
    pub principal_id: Uuid,
    pub count: i64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AuditListing {
    pub logs: Page<AuditEntry>,
    pub action_counts: Vec<ActionCount>,
    pub total_actions: i64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct InstanceAuditListing {
    pub instance: Instance,
    pub logs: Page<AuditEntry>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PrincipalAuditListing {
    pub principal: Principal,
    pub logs: Page<AuditEntry>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AuditStats {
    pub total_logs: i64,
    pub action_stats: Vec<ActionCount>,
    /// Per-principal counts, exposed to admins only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal_stats: Option<Vec<PrincipalActionCount>>,
    pub instance_stats: Vec<InstanceActionCount>,
    pub recent: Vec<AuditEntry>,
}
