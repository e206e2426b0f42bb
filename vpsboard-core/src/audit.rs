//! Append-only audit trail over every mutating operation.
//!
//! Entries are written by the other services after their mutation commits
//! and are never updated or deleted. Listings are scoped: non-admins only
//! see entries they authored or entries referencing instances they own.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;
use vpsboard_common::{
    ActionCount, AuditEntry, AuditListing, AuditStats, Error, InstanceActionCount,
    InstanceAuditListing, Page, PageParams, PrincipalActionCount, PrincipalAuditListing, Result,
};

use crate::policy::{self, Identity, PolicyAction, PolicyTarget, Scope};
use crate::store::{AuditFilter, Store};

/// Caller-supplied listing filters. The principal filter is honored for
/// admins and silently dropped for everyone else.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub action: Option<String>,
    pub instance_id: Option<Uuid>,
    pub principal_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

const TOP_GROUPS: i64 = 10;
const RECENT_ENTRIES: i64 = 5;

#[derive(Clone)]
pub struct AuditService {
    store: Arc<dyn Store>,
}

impl AuditService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        AuditService { store }
    }

    /// Appends one entry on behalf of `actor`. Storage failures are logged
    /// and swallowed: the mutation this entry describes has already
    /// committed and must not be un-reported to the caller.
    pub async fn record(
        &self,
        actor: Uuid,
        action: &str,
        instance_id: Option<Uuid>,
        details: impl Into<String>,
    ) {
        let entry = AuditEntry {
            id: Uuid::new_v4(),
            action: action.to_string(),
            instance_id,
            principal_id: actor,
            timestamp: Utc::now(),
            details: Some(details.into()),
        };
        if let Err(e) = self.store.append_audit(&entry).await {
            tracing::warn!("failed to record audit entry '{}': {}", action, e);
        }
    }

    fn filter_for(&self, who: &Identity, query: &AuditQuery) -> AuditFilter {
        let visible_to = match policy::list_scope(who) {
            Scope::Unrestricted => None,
            Scope::Owned(id) => Some(id),
        };
        AuditFilter {
            action_contains: query.action.clone(),
            instance_id: query.instance_id,
            principal_id: if who.is_admin() { query.principal_id } else { None },
            from: query.from,
            to: query.to,
            visible_to,
        }
    }

    /// Scoped, filtered, newest-first listing with per-action counts over
    /// the same filtered set.
    pub async fn list(
        &self,
        who: &Identity,
        query: &AuditQuery,
        params: &PageParams,
    ) -> Result<AuditListing> {
        let filter = self.filter_for(who, query);
        let rows = self
            .store
            .list_audit(&filter, params.offset(), params.limit())
            .await?;
        let total = self.store.count_audit(&filter).await?;
        let action_counts = self.store.audit_actions(&filter).await?;
        let total_actions = action_counts.iter().map(|c| c.count).sum();
        Ok(AuditListing {
            logs: Page::new(rows, total, params),
            action_counts,
            total_actions,
        })
    }

    /// Trail for one instance. Resolves existence before ownership, so
    /// callers probing foreign ids learn nothing from the status code order.
    pub async fn instance_trail(
        &self,
        who: &Identity,
        instance_id: Uuid,
        action: Option<String>,
        params: &PageParams,
    ) -> Result<InstanceAuditListing> {
        let instance = self
            .store
            .instance_by_id(instance_id)
            .await?
            .ok_or_else(|| Error::not_found("Instance"))?;
        policy::require(
            who,
            PolicyAction::View,
            &PolicyTarget::Instance {
                owner_id: instance.owner_id,
            },
            "Access denied. You can only view logs of your own instances.",
        )?;
        let filter = AuditFilter {
            action_contains: action,
            instance_id: Some(instance_id),
            ..AuditFilter::default()
        };
        let rows = self
            .store
            .list_audit(&filter, params.offset(), params.limit())
            .await?;
        let total = self.store.count_audit(&filter).await?;
        Ok(InstanceAuditListing {
            instance,
            logs: Page::new(rows, total, params),
        })
    }

    /// Trail for one principal, admin only.
    pub async fn principal_trail(
        &self,
        who: &Identity,
        principal_id: Uuid,
        action: Option<String>,
        params: &PageParams,
    ) -> Result<PrincipalAuditListing> {
        if !who.is_admin() {
            return Err(Error::Forbidden("Admin access required".to_string()));
        }
        let principal = self
            .store
            .principal_by_id(principal_id)
            .await?
            .ok_or_else(|| Error::not_found("User"))?;
        let filter = AuditFilter {
            action_contains: action,
            principal_id: Some(principal_id),
            ..AuditFilter::default()
        };
        let rows = self
            .store
            .list_audit(&filter, params.offset(), params.limit())
            .await?;
        let total = self.store.count_audit(&filter).await?;
        Ok(PrincipalAuditListing {
            principal,
            logs: Page::new(rows, total, params),
        })
    }

    /// Entry counts per action tag, highest first, over the caller's
    /// visible slice.
    pub async fn by_action(&self, who: &Identity, query: &AuditQuery) -> Result<Vec<ActionCount>> {
        let filter = self.filter_for(who, query);
        self.store.audit_actions(&filter).await
    }

    /// Entry counts per referenced instance, highest first.
    pub async fn by_instance(
        &self,
        who: &Identity,
        query: &AuditQuery,
    ) -> Result<Vec<InstanceActionCount>> {
        let filter = self.filter_for(who, query);
        self.store.audit_instances(&filter, TOP_GROUPS).await
    }

    pub async fn stats(
        &self,
        who: &Identity,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<AuditStats> {
        let query = AuditQuery {
            from,
            to,
            ..AuditQuery::default()
        };
        let filter = self.filter_for(who, &query);
        let total_logs = self.store.count_audit(&filter).await?;
        let action_stats = self.store.audit_actions(&filter).await?;
        let instance_stats = self.store.audit_instances(&filter, TOP_GROUPS).await?;
        let principal_stats = if who.is_admin() {
            Some(self.store.audit_principals(&filter, TOP_GROUPS).await?)
        } else {
            None
        };
        let recent = self.store.list_audit(&filter, 0, RECENT_ENTRIES).await?;
        Ok(AuditStats {
            total_logs,
            action_stats,
            principal_stats,
            instance_stats,
            recent,
        })
    }

    /// Count of entries visible to the caller, for dashboard rollups.
    pub async fn visible_count(&self, who: &Identity) -> Result<i64> {
        let filter = self.filter_for(who, &AuditQuery::default());
        self.store.count_audit(&filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use chrono::Duration;
    use vpsboard_common::{Instance, InstanceStatus, Role};

    fn identity(role: Role) -> Identity {
        Identity::new(Uuid::new_v4(), role)
    }

    fn instance(owner_id: Uuid, address: &str) -> Instance {
        Instance {
            id: Uuid::new_v4(),
            name: "web".to_string(),
            status: InstanceStatus::Stopped,
            cpu: 2,
            ram: 1024,
            storage: 20,
            address: address.to_string(),
            owner_id,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    async fn service() -> (AuditService, Arc<dyn Store>) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        (AuditService::new(store.clone()), store)
    }

    #[tokio::test]
    async fn action_filter_matches_substring_case_insensitively() {
        let (audit, _) = service().await;
        let admin = identity(Role::Admin);
        audit
            .record(admin.principal_id, "Instance Created", None, "a")
            .await;
        audit
            .record(admin.principal_id, "Instance Started", None, "b")
            .await;
        audit
            .record(admin.principal_id, "Snapshot Created", None, "c")
            .await;

        let query = AuditQuery {
            action: Some("created".to_string()),
            ..AuditQuery::default()
        };
        let listing = audit
            .list(&admin, &query, &PageParams::default())
            .await
            .unwrap();
        assert_eq!(listing.logs.total_count, 2);
        assert!(listing
            .logs
            .items
            .iter()
            .all(|e| e.action.contains("Created")));
    }

    #[tokio::test]
    async fn non_admin_sees_authored_and_owned_instance_entries_only() {
        let (audit, store) = service().await;
        let user = identity(Role::User);
        let other = identity(Role::User);
        let mine = instance(user.principal_id, "10.0.0.1");
        let theirs = instance(other.principal_id, "10.0.0.2");
        store.insert_instance(&mine).await.unwrap();
        store.insert_instance(&theirs).await.unwrap();

        // Authored by the other principal, but on the user's instance.
        audit
            .record(other.principal_id, "Instance Started", Some(mine.id), "x")
            .await;
        // Authored by the user.
        audit
            .record(user.principal_id, "Instance Created", Some(mine.id), "y")
            .await;
        // Unrelated on both axes.
        audit
            .record(other.principal_id, "Instance Stopped", Some(theirs.id), "z")
            .await;

        let listing = audit
            .list(&user, &AuditQuery::default(), &PageParams::default())
            .await
            .unwrap();
        assert_eq!(listing.logs.total_count, 2);

        let all = audit
            .list(&identity(Role::Admin), &AuditQuery::default(), &PageParams::default())
            .await
            .unwrap();
        assert_eq!(all.logs.total_count, 3);
    }

    #[tokio::test]
    async fn principal_filter_is_dropped_for_non_admins() {
        let (audit, _) = service().await;
        let user = identity(Role::User);
        let other = identity(Role::User);
        audit
            .record(user.principal_id, "Instance Created", None, "mine")
            .await;
        audit
            .record(other.principal_id, "Instance Created", None, "theirs")
            .await;

        let query = AuditQuery {
            principal_id: Some(other.principal_id),
            ..AuditQuery::default()
        };
        // The filter is ignored, and the scope still hides the other entry.
        let listing = audit
            .list(&user, &query, &PageParams::default())
            .await
            .unwrap();
        assert_eq!(listing.logs.total_count, 1);
        assert_eq!(listing.logs.items[0].principal_id, user.principal_id);

        let admin_listing = audit
            .list(&identity(Role::Admin), &query, &PageParams::default())
            .await
            .unwrap();
        assert_eq!(admin_listing.logs.total_count, 1);
        assert_eq!(admin_listing.logs.items[0].principal_id, other.principal_id);
    }

    #[tokio::test]
    async fn time_range_bounds_are_inclusive_of_interior_entries() {
        let (audit, store) = service().await;
        let admin = identity(Role::Admin);
        let now = Utc::now();
        for (action, age_minutes) in [("Old", 120), ("Mid", 60), ("New", 1)] {
            let entry = AuditEntry {
                id: Uuid::new_v4(),
                action: action.to_string(),
                instance_id: None,
                principal_id: admin.principal_id,
                timestamp: now - Duration::minutes(age_minutes),
                details: None,
            };
            store.append_audit(&entry).await.unwrap();
        }

        let query = AuditQuery {
            from: Some(now - Duration::minutes(90)),
            to: Some(now - Duration::minutes(30)),
            ..AuditQuery::default()
        };
        let listing = audit
            .list(&admin, &query, &PageParams::default())
            .await
            .unwrap();
        assert_eq!(listing.logs.total_count, 1);
        assert_eq!(listing.logs.items[0].action, "Mid");
    }

    #[tokio::test]
    async fn action_counts_sort_highest_first() {
        let (audit, _) = service().await;
        let admin = identity(Role::Admin);
        for _ in 0..3 {
            audit
                .record(admin.principal_id, "Instance Started", None, "")
                .await;
        }
        audit
            .record(admin.principal_id, "Instance Created", None, "")
            .await;

        let counts = audit
            .by_action(&admin, &AuditQuery::default())
            .await
            .unwrap();
        assert_eq!(counts[0].action, "Instance Started");
        assert_eq!(counts[0].count, 3);
        assert_eq!(counts[1].count, 1);
    }

    #[tokio::test]
    async fn principal_trail_requires_admin_before_existence() {
        let (audit, _) = service().await;
        let user = identity(Role::User);
        let err = audit
            .principal_trail(&user, Uuid::new_v4(), None, &PageParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));

        let admin = identity(Role::Admin);
        let err = audit
            .principal_trail(&admin, Uuid::new_v4(), None, &PageParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn stats_hide_principal_breakdown_from_non_admins() {
        let (audit, _) = service().await;
        let user = identity(Role::User);
        audit
            .record(user.principal_id, "Instance Created", None, "")
            .await;

        let stats = audit.stats(&user, None, None).await.unwrap();
        assert!(stats.principal_stats.is_none());
        assert_eq!(stats.total_logs, 1);

        let admin_stats = audit
            .stats(&identity(Role::Admin), None, None)
            .await
            .unwrap();
        assert!(admin_stats.principal_stats.is_some());
    }
}
