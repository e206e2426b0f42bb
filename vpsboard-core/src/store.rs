use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use vpsboard_common::{
    ActionCount, ActualUsage, AuditEntry, CapacityLedger, Instance, InstanceActionCount,
    InstanceStatus, Principal, PrincipalActionCount, Result, Snapshot, StatusAggregate,
};

/// Filters applied to audit listings, counts and aggregations.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Case-insensitive substring match on the action tag.
    pub action_contains: Option<String>,
    pub instance_id: Option<Uuid>,
    pub principal_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// When set, restrict rows to entries authored by this principal or
    /// referencing an instance they currently own.
    pub visible_to: Option<Uuid>,
}

/// Persistence seam for the whole system. Backed by Postgres in production
/// and by an in-memory table set in tests.
///
/// Uniqueness rules live here: `insert_principal`/`update_principal` fail
/// with `DuplicateIdentity` when the username or email is taken, and
/// `insert_instance` fails with `DuplicateAddress` when the address is.
#[async_trait]
pub trait Store: Send + Sync {
    // Principals

    async fn insert_principal(&self, principal: &Principal) -> Result<()>;
    async fn principal_by_id(&self, id: Uuid) -> Result<Option<Principal>>;
    async fn principal_by_email(&self, email: &str) -> Result<Option<Principal>>;
    async fn principal_by_username(&self, username: &str) -> Result<Option<Principal>>;
    async fn identity_taken(
        &self,
        username: &str,
        email: &str,
        exclude: Option<Uuid>,
    ) -> Result<bool>;
    async fn list_principals(&self, offset: i64, limit: i64) -> Result<Vec<Principal>>;
    async fn count_principals(&self) -> Result<i64>;
    async fn update_principal(&self, principal: &Principal) -> Result<()>;
    async fn delete_principal(&self, id: Uuid) -> Result<bool>;

    // Instances

    async fn insert_instance(&self, instance: &Instance) -> Result<()>;
    async fn instance_by_id(&self, id: Uuid) -> Result<Option<Instance>>;
    async fn list_instances(
        &self,
        owner: Option<Uuid>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Instance>>;
    async fn count_instances(&self, owner: Option<Uuid>) -> Result<i64>;
    async fn update_instance_fields(
        &self,
        id: Uuid,
        name: Option<&str>,
        cpu: Option<i32>,
        ram: Option<i32>,
        storage: Option<i32>,
    ) -> Result<Option<Instance>>;
    /// Compare-and-swap lifecycle transition. Returns the refreshed row when
    /// the current status was in `from`, `None` when it was not (or the
    /// instance vanished). Concurrent transitions on one instance serialize
    /// through this call.
    async fn transition_instance(
        &self,
        id: Uuid,
        from: &[InstanceStatus],
        to: InstanceStatus,
    ) -> Result<Option<Instance>>;
    /// Removes the instance and every snapshot attached to it.
    async fn delete_instance(&self, id: Uuid) -> Result<bool>;
    /// Sums cpu/ram/storage over instances currently in the running state.
    async fn running_usage(&self) -> Result<ActualUsage>;
    async fn status_aggregates(&self) -> Result<Vec<StatusAggregate>>;

    // Snapshots

    async fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<()>;
    async fn snapshot_by_id(&self, id: Uuid) -> Result<Option<Snapshot>>;
    async fn list_snapshots(
        &self,
        instance_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Snapshot>>;
    async fn count_snapshots(&self, instance_id: Uuid) -> Result<i64>;
    async fn list_all_snapshots(&self, offset: i64, limit: i64) -> Result<Vec<Snapshot>>;
    async fn count_all_snapshots(&self) -> Result<i64>;
    async fn delete_snapshot(&self, id: Uuid) -> Result<bool>;

    // Capacity ledger

    /// Most recently updated ledger row, if any exists.
    async fn ledger(&self) -> Result<Option<CapacityLedger>>;
    async fn insert_ledger(&self, ledger: &CapacityLedger) -> Result<()>;
    async fn update_ledger(&self, ledger: &CapacityLedger) -> Result<()>;
    async fn count_ledger_rows(&self) -> Result<i64>;

    // Audit log

    async fn append_audit(&self, entry: &AuditEntry) -> Result<()>;
    /// Newest-first listing under `filter`.
    async fn list_audit(
        &self,
        filter: &AuditFilter,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<AuditEntry>>;
    async fn count_audit(&self, filter: &AuditFilter) -> Result<i64>;
    /// Entry counts grouped by action tag, highest first.
    async fn audit_actions(&self, filter: &AuditFilter) -> Result<Vec<ActionCount>>;
    /// Entry counts grouped by referenced instance, highest first.
    async fn audit_instances(
        &self,
        filter: &AuditFilter,
        limit: i64,
    ) -> Result<Vec<InstanceActionCount>>;
    /// Entry counts grouped by author, highest first.
    async fn audit_principals(
        &self,
        filter: &AuditFilter,
        limit: i64,
    ) -> Result<Vec<PrincipalActionCount>>;
}
