//! In-memory [`Store`] implementation.
//!
//! Backs the test suites and local experiments. Every read-modify-write
//! holds the write lock for its whole duration, so per-entity operations
//! serialize exactly like the conditional updates in the Postgres backend.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;
use vpsboard_common::{
    ActionCount, ActualUsage, AuditEntry, CapacityLedger, Error, Instance, InstanceActionCount,
    InstanceStatus, Principal, PrincipalActionCount, Result, Snapshot, StatusAggregate,
};

use crate::store::{AuditFilter, Store};

#[derive(Default)]
struct Inner {
    principals: HashMap<Uuid, Principal>,
    instances: HashMap<Uuid, Instance>,
    snapshots: HashMap<Uuid, Snapshot>,
    ledger: Option<CapacityLedger>,
    audit: Vec<AuditEntry>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

fn page<T: Clone>(sorted: Vec<&T>, offset: i64, limit: i64) -> Vec<T> {
    sorted
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .cloned()
        .collect()
}

impl Inner {
    fn entry_matches(&self, entry: &AuditEntry, filter: &AuditFilter) -> bool {
        if let Some(needle) = &filter.action_contains {
            if !entry
                .action
                .to_lowercase()
                .contains(&needle.to_lowercase())
            {
                return false;
            }
        }
        if let Some(instance_id) = filter.instance_id {
            if entry.instance_id != Some(instance_id) {
                return false;
            }
        }
        if let Some(principal_id) = filter.principal_id {
            if entry.principal_id != principal_id {
                return false;
            }
        }
        if let Some(from) = filter.from {
            if entry.timestamp < from {
                return false;
            }
        }
        if let Some(to) = filter.to {
            if entry.timestamp > to {
                return false;
            }
        }
        if let Some(viewer) = filter.visible_to {
            let authored = entry.principal_id == viewer;
            let on_owned_instance = entry
                .instance_id
                .and_then(|id| self.instances.get(&id))
                .map(|i| i.owner_id == viewer)
                .unwrap_or(false);
            if !authored && !on_owned_instance {
                return false;
            }
        }
        true
    }

    fn filtered_audit(&self, filter: &AuditFilter) -> Vec<&AuditEntry> {
        let mut rows: Vec<&AuditEntry> = self
            .audit
            .iter()
            .filter(|e| self.entry_matches(e, filter))
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        rows
    }
}

fn counts_desc<K: Ord + Clone>(map: HashMap<K, i64>) -> Vec<(K, i64)> {
    let mut rows: Vec<(K, i64)> = map.into_iter().collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    rows
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_principal(&self, principal: &Principal) -> Result<()> {
        let mut inner = self.inner.write().await;
        let taken = inner
            .principals
            .values()
            .any(|p| p.username == principal.username || p.email == principal.email);
        if taken {
            return Err(Error::DuplicateIdentity(
                "username or email already in use".to_string(),
            ));
        }
        inner.principals.insert(principal.id, principal.clone());
        Ok(())
    }

    async fn principal_by_id(&self, id: Uuid) -> Result<Option<Principal>> {
        Ok(self.inner.read().await.principals.get(&id).cloned())
    }

    async fn principal_by_email(&self, email: &str) -> Result<Option<Principal>> {
        Ok(self
            .inner
            .read()
            .await
            .principals
            .values()
            .find(|p| p.email == email)
            .cloned())
    }

    async fn principal_by_username(&self, username: &str) -> Result<Option<Principal>> {
        Ok(self
            .inner
            .read()
            .await
            .principals
            .values()
            .find(|p| p.username == username)
            .cloned())
    }

    async fn identity_taken(
        &self,
        username: &str,
        email: &str,
        exclude: Option<Uuid>,
    ) -> Result<bool> {
        Ok(self
            .inner
            .read()
            .await
            .principals
            .values()
            .filter(|p| Some(p.id) != exclude)
            .any(|p| p.username == username || p.email == email))
    }

    async fn list_principals(&self, offset: i64, limit: i64) -> Result<Vec<Principal>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<&Principal> = inner.principals.values().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(page(rows, offset, limit))
    }

    async fn count_principals(&self) -> Result<i64> {
        Ok(self.inner.read().await.principals.len() as i64)
    }

    async fn update_principal(&self, principal: &Principal) -> Result<()> {
        let mut inner = self.inner.write().await;
        let taken = inner
            .principals
            .values()
            .filter(|p| p.id != principal.id)
            .any(|p| p.username == principal.username || p.email == principal.email);
        if taken {
            return Err(Error::DuplicateIdentity(
                "username or email already in use".to_string(),
            ));
        }
        if !inner.principals.contains_key(&principal.id) {
            return Err(Error::not_found("User"));
        }
        inner.principals.insert(principal.id, principal.clone());
        Ok(())
    }

    async fn delete_principal(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let removed = inner.principals.remove(&id).is_some();
        if removed {
            let owned: Vec<Uuid> = inner
                .instances
                .values()
                .filter(|i| i.owner_id == id)
                .map(|i| i.id)
                .collect();
            for instance_id in owned {
                inner.instances.remove(&instance_id);
                inner.snapshots.retain(|_, s| s.instance_id != instance_id);
            }
        }
        Ok(removed)
    }

    async fn insert_instance(&self, instance: &Instance) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner
            .instances
            .values()
            .any(|i| i.address == instance.address)
        {
            return Err(Error::DuplicateAddress(
                "Address is already in use".to_string(),
            ));
        }
        inner.instances.insert(instance.id, instance.clone());
        Ok(())
    }

    async fn instance_by_id(&self, id: Uuid) -> Result<Option<Instance>> {
        Ok(self.inner.read().await.instances.get(&id).cloned())
    }

    async fn list_instances(
        &self,
        owner: Option<Uuid>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Instance>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<&Instance> = inner
            .instances
            .values()
            .filter(|i| owner.map(|o| i.owner_id == o).unwrap_or(true))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(page(rows, offset, limit))
    }

    async fn count_instances(&self, owner: Option<Uuid>) -> Result<i64> {
        Ok(self
            .inner
            .read()
            .await
            .instances
            .values()
            .filter(|i| owner.map(|o| i.owner_id == o).unwrap_or(true))
            .count() as i64)
    }

    async fn update_instance_fields(
        &self,
        id: Uuid,
        name: Option<&str>,
        cpu: Option<i32>,
        ram: Option<i32>,
        storage: Option<i32>,
    ) -> Result<Option<Instance>> {
        let mut inner = self.inner.write().await;
        let Some(instance) = inner.instances.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = name {
            instance.name = name.to_string();
        }
        if let Some(cpu) = cpu {
            instance.cpu = cpu;
        }
        if let Some(ram) = ram {
            instance.ram = ram;
        }
        if let Some(storage) = storage {
            instance.storage = storage;
        }
        instance.updated_at = Utc::now();
        Ok(Some(instance.clone()))
    }

    async fn transition_instance(
        &self,
        id: Uuid,
        from: &[InstanceStatus],
        to: InstanceStatus,
    ) -> Result<Option<Instance>> {
        let mut inner = self.inner.write().await;
        let Some(instance) = inner.instances.get_mut(&id) else {
            return Ok(None);
        };
        if !from.contains(&instance.status) {
            return Ok(None);
        }
        instance.status = to;
        instance.updated_at = Utc::now();
        Ok(Some(instance.clone()))
    }

    async fn delete_instance(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let removed = inner.instances.remove(&id).is_some();
        if removed {
            inner.snapshots.retain(|_, s| s.instance_id != id);
        }
        Ok(removed)
    }

    async fn running_usage(&self) -> Result<ActualUsage> {
        let inner = self.inner.read().await;
        let mut usage = ActualUsage {
            cpu: 0,
            ram: 0,
            storage: 0,
            running_count: 0,
        };
        for instance in inner.instances.values() {
            if instance.status == InstanceStatus::Running {
                usage.cpu += instance.cpu as i64;
                usage.ram += instance.ram as i64;
                usage.storage += instance.storage as i64;
                usage.running_count += 1;
            }
        }
        Ok(usage)
    }

    async fn status_aggregates(&self) -> Result<Vec<StatusAggregate>> {
        let inner = self.inner.read().await;
        let mut aggregates = Vec::new();
        for status in [
            InstanceStatus::Stopped,
            InstanceStatus::Running,
            InstanceStatus::Paused,
            InstanceStatus::Error,
        ] {
            let mut aggregate = StatusAggregate {
                status,
                count: 0,
                cpu: 0,
                ram: 0,
                storage: 0,
            };
            for instance in inner.instances.values().filter(|i| i.status == status) {
                aggregate.count += 1;
                aggregate.cpu += instance.cpu as i64;
                aggregate.ram += instance.ram as i64;
                aggregate.storage += instance.storage as i64;
            }
            if aggregate.count > 0 {
                aggregates.push(aggregate);
            }
        }
        Ok(aggregates)
    }

    async fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.snapshots.insert(snapshot.id, snapshot.clone());
        Ok(())
    }

    async fn snapshot_by_id(&self, id: Uuid) -> Result<Option<Snapshot>> {
        Ok(self.inner.read().await.snapshots.get(&id).cloned())
    }

    async fn list_snapshots(
        &self,
        instance_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Snapshot>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<&Snapshot> = inner
            .snapshots
            .values()
            .filter(|s| s.instance_id == instance_id)
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(page(rows, offset, limit))
    }

    async fn count_snapshots(&self, instance_id: Uuid) -> Result<i64> {
        Ok(self
            .inner
            .read()
            .await
            .snapshots
            .values()
            .filter(|s| s.instance_id == instance_id)
            .count() as i64)
    }

    async fn list_all_snapshots(&self, offset: i64, limit: i64) -> Result<Vec<Snapshot>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<&Snapshot> = inner.snapshots.values().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(page(rows, offset, limit))
    }

    async fn count_all_snapshots(&self) -> Result<i64> {
        Ok(self.inner.read().await.snapshots.len() as i64)
    }

    async fn delete_snapshot(&self, id: Uuid) -> Result<bool> {
        Ok(self.inner.write().await.snapshots.remove(&id).is_some())
    }

    async fn ledger(&self) -> Result<Option<CapacityLedger>> {
        Ok(self.inner.read().await.ledger.clone())
    }

    async fn insert_ledger(&self, ledger: &CapacityLedger) -> Result<()> {
        self.inner.write().await.ledger = Some(ledger.clone());
        Ok(())
    }

    async fn update_ledger(&self, ledger: &CapacityLedger) -> Result<()> {
        self.inner.write().await.ledger = Some(ledger.clone());
        Ok(())
    }

    async fn count_ledger_rows(&self) -> Result<i64> {
        Ok(if self.inner.read().await.ledger.is_some() {
            1
        } else {
            0
        })
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<()> {
        self.inner.write().await.audit.push(entry.clone());
        Ok(())
    }

    async fn list_audit(
        &self,
        filter: &AuditFilter,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<AuditEntry>> {
        let inner = self.inner.read().await;
        Ok(page(inner.filtered_audit(filter), offset, limit))
    }

    async fn count_audit(&self, filter: &AuditFilter) -> Result<i64> {
        let inner = self.inner.read().await;
        Ok(inner.filtered_audit(filter).len() as i64)
    }

    async fn audit_actions(&self, filter: &AuditFilter) -> Result<Vec<ActionCount>> {
        let inner = self.inner.read().await;
        let mut counts: HashMap<String, i64> = HashMap::new();
        for entry in inner.filtered_audit(filter) {
            *counts.entry(entry.action.clone()).or_insert(0) += 1;
        }
        Ok(counts_desc(counts)
            .into_iter()
            .map(|(action, count)| ActionCount { action, count })
            .collect())
    }

    async fn audit_instances(
        &self,
        filter: &AuditFilter,
        limit: i64,
    ) -> Result<Vec<InstanceActionCount>> {
        let inner = self.inner.read().await;
        let mut counts: HashMap<Uuid, i64> = HashMap::new();
        for entry in inner.filtered_audit(filter) {
            if let Some(instance_id) = entry.instance_id {
                *counts.entry(instance_id).or_insert(0) += 1;
            }
        }
        Ok(counts_desc(counts)
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|(instance_id, count)| InstanceActionCount { instance_id, count })
            .collect())
    }

    async fn audit_principals(
        &self,
        filter: &AuditFilter,
        limit: i64,
    ) -> Result<Vec<PrincipalActionCount>> {
        let inner = self.inner.read().await;
        let mut counts: HashMap<Uuid, i64> = HashMap::new();
        for entry in inner.filtered_audit(filter) {
            *counts.entry(entry.principal_id).or_insert(0) += 1;
        }
        Ok(counts_desc(counts)
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|(principal_id, count)| PrincipalActionCount {
                principal_id,
                count,
            })
            .collect())
    }
}
