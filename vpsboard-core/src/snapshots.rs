//! Snapshot catalog: restore markers hanging off instances.
//!
//! A snapshot never embeds its instance; every operation resolves the
//! owning instance through the store and authorizes against that row.
//! Restore is record-keeping only: it verifies preconditions and writes an
//! audit entry without touching the instance state.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use vpsboard_common::{
    CreateSnapshotRequest, Error, Instance, InstanceStatus, Page, PageParams, Result, Snapshot,
};

use crate::audit::AuditService;
use crate::policy::{self, Identity, PolicyAction, PolicyTarget, Scope};
use crate::store::Store;

/// A snapshot joined with the instance it belongs to.
#[derive(Debug)]
pub struct SnapshotWithInstance {
    pub snapshot: Snapshot,
    pub instance: Instance,
}

#[derive(Clone)]
pub struct SnapshotService {
    store: Arc<dyn Store>,
    audit: AuditService,
}

impl SnapshotService {
    pub fn new(store: Arc<dyn Store>, audit: AuditService) -> Self {
        SnapshotService { store, audit }
    }

    async fn fetch(&self, id: Uuid) -> Result<SnapshotWithInstance> {
        let snapshot = self
            .store
            .snapshot_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found("Snapshot"))?;
        let instance = self
            .store
            .instance_by_id(snapshot.instance_id)
            .await?
            .ok_or_else(|| Error::not_found("Instance"))?;
        Ok(SnapshotWithInstance { snapshot, instance })
    }

    /// Creates a snapshot of a running instance. A blank name falls back to
    /// a millisecond-timestamped one.
    pub async fn create(
        &self,
        who: &Identity,
        instance_id: Uuid,
        req: &CreateSnapshotRequest,
    ) -> Result<Snapshot> {
        let instance = self
            .store
            .instance_by_id(instance_id)
            .await?
            .ok_or_else(|| Error::not_found("Instance"))?;
        policy::require(
            who,
            PolicyAction::Mutate,
            &PolicyTarget::Instance {
                owner_id: instance.owner_id,
            },
            "Access denied. You can only create snapshots for your own instances.",
        )?;
        if instance.status != InstanceStatus::Running {
            return Err(Error::InvalidStateTransition(
                "Instance must be running to create snapshot".to_string(),
            ));
        }

        let name = match req.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("snapshot-{}", Utc::now().timestamp_millis()),
        };
        let snapshot = Snapshot {
            id: Uuid::new_v4(),
            instance_id: instance.id,
            name,
            created_at: Utc::now(),
        };
        self.store.insert_snapshot(&snapshot).await?;

        self.audit
            .record(
                who.principal_id,
                "Snapshot Created",
                Some(instance.id),
                format!(
                    "Snapshot \"{}\" created for Instance \"{}\"",
                    snapshot.name, instance.name
                ),
            )
            .await;
        Ok(snapshot)
    }

    /// Newest-first snapshots of one instance.
    pub async fn list(
        &self,
        who: &Identity,
        instance_id: Uuid,
        params: &PageParams,
    ) -> Result<Page<Snapshot>> {
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
            "Access denied. You can only view snapshots of your own instances.",
        )?;
        let rows = self
            .store
            .list_snapshots(instance_id, params.offset(), params.limit())
            .await?;
        let total = self.store.count_snapshots(instance_id).await?;
        Ok(Page::new(rows, total, params))
    }

    /// Every snapshot across every tenant, admin only.
    pub async fn list_all(&self, who: &Identity, params: &PageParams) -> Result<Page<Snapshot>> {
        if let Scope::Owned(_) = policy::list_scope(who) {
            return Err(Error::Forbidden("Admin access required".to_string()));
        }
        let rows = self
            .store
            .list_all_snapshots(params.offset(), params.limit())
            .await?;
        let total = self.store.count_all_snapshots().await?;
        Ok(Page::new(rows, total, params))
    }

    pub async fn get(&self, who: &Identity, id: Uuid) -> Result<SnapshotWithInstance> {
        let found = self.fetch(id).await?;
        policy::require(
            who,
            PolicyAction::View,
            &PolicyTarget::Snapshot {
                instance_owner_id: found.instance.owner_id,
            },
            "Access denied. You can only view snapshots of your own instances.",
        )?;
        Ok(found)
    }

    pub async fn delete(&self, who: &Identity, id: Uuid) -> Result<()> {
        let found = self.fetch(id).await?;
        policy::require(
            who,
            PolicyAction::Delete,
            &PolicyTarget::Snapshot {
                instance_owner_id: found.instance.owner_id,
            },
            "Access denied. You can only delete snapshots of your own instances.",
        )?;
        if !self.store.delete_snapshot(id).await? {
            return Err(Error::not_found("Snapshot"));
        }

        self.audit
            .record(
                who.principal_id,
                "Snapshot Deleted",
                Some(found.instance.id),
                format!("Snapshot \"{}\" deleted successfully", found.snapshot.name),
            )
            .await;
        Ok(())
    }

    /// Marks a restore of a stopped instance from one of its snapshots.
    pub async fn restore(&self, who: &Identity, id: Uuid) -> Result<SnapshotWithInstance> {
        let found = self.fetch(id).await?;
        policy::require(
            who,
            PolicyAction::Mutate,
            &PolicyTarget::Snapshot {
                instance_owner_id: found.instance.owner_id,
            },
            "Access denied. You can only restore from snapshots of your own instances.",
        )?;
        if found.instance.status != InstanceStatus::Stopped {
            return Err(Error::InvalidStateTransition(
                "Instance must be stopped to restore from snapshot".to_string(),
            ));
        }

        self.audit
            .record(
                who.principal_id,
                "Instance Restored from Snapshot",
                Some(found.instance.id),
                format!(
                    "Instance \"{}\" restored from snapshot \"{}\"",
                    found.instance.name, found.snapshot.name
                ),
            )
            .await;
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerService;
    use crate::memory::MemoryStore;
    use crate::registry::RegistryService;
    use crate::store::AuditFilter;
    use chrono::Duration;
    use vpsboard_common::{CreateInstanceRequest, Role};

    struct Fixture {
        snapshots: SnapshotService,
        registry: RegistryService,
        store: Arc<dyn Store>,
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let audit = AuditService::new(store.clone());
        let ledger = LedgerService::new(store.clone(), audit.clone());
        Fixture {
            snapshots: SnapshotService::new(store.clone(), audit.clone()),
            registry: RegistryService::new(store.clone(), ledger, audit),
            store,
        }
    }

    fn admin() -> Identity {
        Identity::new(Uuid::new_v4(), Role::Admin)
    }

    fn user() -> Identity {
        Identity::new(Uuid::new_v4(), Role::User)
    }

    async fn running_instance(fx: &Fixture, who: &Identity, address: &str) -> Instance {
        let req = CreateInstanceRequest {
            name: "web-server".to_string(),
            cpu: 2,
            ram: 1024,
            storage: 20,
            address: address.to_string(),
        };
        let id = fx.registry.create(who, &req).await.unwrap().instance.id;
        fx.registry.start(who, id).await.unwrap().instance
    }

    #[tokio::test]
    async fn snapshot_requires_a_running_instance() {
        let fx = fixture();
        let who = user();
        let instance = running_instance(&fx, &who, "10.2.0.1").await;
        fx.registry.stop(&who, instance.id).await.unwrap();

        let err = fx
            .snapshots
            .create(&who, instance.id, &CreateSnapshotRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition(_)));
    }

    #[tokio::test]
    async fn blank_names_fall_back_to_timestamped_ones() {
        let fx = fixture();
        let who = user();
        let instance = running_instance(&fx, &who, "10.2.0.1").await;

        let unnamed = fx
            .snapshots
            .create(&who, instance.id, &CreateSnapshotRequest::default())
            .await
            .unwrap();
        assert!(unnamed.name.starts_with("snapshot-"));

        let named = fx
            .snapshots
            .create(
                &who,
                instance.id,
                &CreateSnapshotRequest {
                    name: Some("  before-upgrade  ".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(named.name, "before-upgrade");
    }

    #[tokio::test]
    async fn snapshot_then_restore_round_trip() {
        let fx = fixture();
        let who = user();
        let instance = running_instance(&fx, &who, "10.2.0.1").await;
        let snapshot = fx
            .snapshots
            .create(
                &who,
                instance.id,
                &CreateSnapshotRequest {
                    name: Some("golden".to_string()),
                },
            )
            .await
            .unwrap();

        // Restore refuses while the instance is running.
        let err = fx.snapshots.restore(&who, snapshot.id).await.unwrap_err();
        assert!(
            matches!(&err, Error::InvalidStateTransition(m) if m == "Instance must be stopped to restore from snapshot")
        );

        fx.registry.stop(&who, instance.id).await.unwrap();
        let restored = fx.snapshots.restore(&who, snapshot.id).await.unwrap();
        assert_eq!(restored.snapshot.id, snapshot.id);
        // Restore records, it does not transition.
        assert_eq!(
            fx.store
                .instance_by_id(instance.id)
                .await
                .unwrap()
                .unwrap()
                .status,
            InstanceStatus::Stopped
        );

        let entries = fx
            .store
            .list_audit(&AuditFilter::default(), 0, 50)
            .await
            .unwrap();
        let restored_entry = entries
            .iter()
            .find(|e| e.action == "Instance Restored from Snapshot")
            .unwrap();
        assert_eq!(restored_entry.instance_id, Some(instance.id));
        assert_eq!(
            restored_entry.details.as_deref(),
            Some("Instance \"web-server\" restored from snapshot \"golden\"")
        );
    }

    #[tokio::test]
    async fn listing_is_newest_first() {
        let fx = fixture();
        let who = user();
        let instance = running_instance(&fx, &who, "10.2.0.1").await;
        let now = Utc::now();
        for (name, age_minutes) in [("old", 30), ("mid", 20), ("new", 10)] {
            let snapshot = Snapshot {
                id: Uuid::new_v4(),
                instance_id: instance.id,
                name: name.to_string(),
                created_at: now - Duration::minutes(age_minutes),
            };
            fx.store.insert_snapshot(&snapshot).await.unwrap();
        }

        let page = fx
            .snapshots
            .list(&who, instance.id, &PageParams::default())
            .await
            .unwrap();
        let names: Vec<&str> = page.items.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn cross_tenant_listing_is_admin_only() {
        let fx = fixture();
        let who = user();
        let instance = running_instance(&fx, &who, "10.2.0.1").await;
        fx.snapshots
            .create(&who, instance.id, &CreateSnapshotRequest::default())
            .await
            .unwrap();

        let err = fx
            .snapshots
            .list_all(&who, &PageParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));

        let page = fx
            .snapshots
            .list_all(&admin(), &PageParams::default())
            .await
            .unwrap();
        assert_eq!(page.total_count, 1);
    }

    #[tokio::test]
    async fn only_the_owner_or_an_admin_may_delete() {
        let fx = fixture();
        let who = user();
        let intruder = user();
        let instance = running_instance(&fx, &who, "10.2.0.1").await;
        let snapshot = fx
            .snapshots
            .create(&who, instance.id, &CreateSnapshotRequest::default())
            .await
            .unwrap();

        let err = fx
            .snapshots
            .delete(&intruder, snapshot.id)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));

        fx.snapshots.delete(&who, snapshot.id).await.unwrap();
        assert!(fx
            .store
            .snapshot_by_id(snapshot.id)
            .await
            .unwrap()
            .is_none());

        let err = fx.snapshots.get(&who, snapshot.id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
