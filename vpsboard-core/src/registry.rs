//! Instance registry: ownership-scoped CRUD and the lifecycle state
//! machine.
//!
//! Transitions go through a compare-and-swap on the stored status, so two
//! callers racing on one instance cannot both win. After every committed
//! mutation a capacity reconcile runs best-effort; when it fails the
//! mutation stays committed and the failure is reported as a warning.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use vpsboard_common::{
    limits, CreateInstanceRequest, Error, Instance, InstanceStatus, Page, PageParams, Result,
    UpdateInstanceRequest,
};

use crate::audit::AuditService;
use crate::ledger::LedgerService;
use crate::policy::{self, Identity, PolicyAction, PolicyTarget, Scope};
use crate::store::Store;

/// A committed mutation plus the reconcile outcome attached to it.
#[derive(Debug)]
pub struct MutationOutcome {
    pub instance: Instance,
    pub warning: Option<String>,
}

fn validate_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.len() < 3 || trimmed.len() > 100 {
        return Err(Error::InvalidRange(
            "Instance name must be between 3 and 100 characters".to_string(),
        ));
    }
    Ok(())
}

fn validate_sizing(cpu: Option<i32>, ram: Option<i32>, storage: Option<i32>) -> Result<()> {
    if let Some(cpu) = cpu {
        if !(limits::INSTANCE_CPU_MIN..=limits::INSTANCE_CPU_MAX).contains(&cpu) {
            return Err(Error::InvalidRange(
                "CPU must be between 1 and 32".to_string(),
            ));
        }
    }
    if let Some(ram) = ram {
        if !(limits::INSTANCE_RAM_MIN..=limits::INSTANCE_RAM_MAX).contains(&ram) {
            return Err(Error::InvalidRange(
                "RAM must be between 512MB and 32768MB (32GB)".to_string(),
            ));
        }
    }
    if let Some(storage) = storage {
        if !(limits::INSTANCE_STORAGE_MIN..=limits::INSTANCE_STORAGE_MAX).contains(&storage) {
            return Err(Error::InvalidRange(
                "Storage must be between 10GB and 2048GB (2TB)".to_string(),
            ));
        }
    }
    Ok(())
}

#[derive(Clone)]
pub struct RegistryService {
    store: Arc<dyn Store>,
    ledger: LedgerService,
    audit: AuditService,
}

impl RegistryService {
    pub fn new(store: Arc<dyn Store>, ledger: LedgerService, audit: AuditService) -> Self {
        RegistryService {
            store,
            ledger,
            audit,
        }
    }

    async fn reconcile_after(&self, actor: Uuid) -> Option<String> {
        match self.ledger.reconcile_as(actor).await {
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("capacity reconcile after instance mutation failed: {}", e);
                Some(format!("capacity reconcile failed: {e}"))
            }
        }
    }

    /// Creates a stopped instance owned by the caller.
    pub async fn create(
        &self,
        who: &Identity,
        req: &CreateInstanceRequest,
    ) -> Result<MutationOutcome> {
        validate_name(&req.name)?;
        validate_sizing(Some(req.cpu), Some(req.ram), Some(req.storage))?;
        let address = req.address.trim();
        if address.is_empty() {
            return Err(Error::InvalidRange("Address is required".to_string()));
        }

        let now = Utc::now();
        let instance = Instance {
            id: Uuid::new_v4(),
            name: req.name.trim().to_string(),
            status: InstanceStatus::Stopped,
            cpu: req.cpu,
            ram: req.ram,
            storage: req.storage,
            address: address.to_string(),
            owner_id: who.principal_id,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_instance(&instance).await?;

        self.audit
            .record(
                who.principal_id,
                "Instance Created",
                Some(instance.id),
                format!(
                    "Instance \"{}\" created with {} CPU, {}MB RAM, {}GB storage",
                    instance.name, instance.cpu, instance.ram, instance.storage
                ),
            )
            .await;
        let warning = self.reconcile_after(who.principal_id).await;
        Ok(MutationOutcome { instance, warning })
    }

    /// Fetches one instance. Existence resolves before ownership: unknown
    /// ids return not-found for everyone, foreign ids return forbidden.
    pub async fn get(&self, who: &Identity, id: Uuid) -> Result<Instance> {
        let instance = self
            .store
            .instance_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found("Instance"))?;
        policy::require(
            who,
            PolicyAction::View,
            &PolicyTarget::Instance {
                owner_id: instance.owner_id,
            },
            "Access denied. You can only access your own instances.",
        )?;
        Ok(instance)
    }

    pub async fn list(&self, who: &Identity, params: &PageParams) -> Result<Page<Instance>> {
        let owner = match policy::list_scope(who) {
            Scope::Unrestricted => None,
            Scope::Owned(id) => Some(id),
        };
        let rows = self
            .store
            .list_instances(owner, params.offset(), params.limit())
            .await?;
        let total = self.store.count_instances(owner).await?;
        Ok(Page::new(rows, total, params))
    }

    async fn lifecycle(
        &self,
        who: &Identity,
        id: Uuid,
        from: &[InstanceStatus],
        to: InstanceStatus,
        guard: &str,
        action: &str,
        detail_suffix: &str,
    ) -> Result<MutationOutcome> {
        let current = self
            .store
            .instance_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found("Instance"))?;
        policy::require(
            who,
            PolicyAction::Mutate,
            &PolicyTarget::Instance {
                owner_id: current.owner_id,
            },
            "Access denied. You can only control your own instances.",
        )?;
        if !from.contains(&current.status) {
            return Err(Error::InvalidStateTransition(guard.to_string()));
        }
        let Some(instance) = self.store.transition_instance(id, from, to).await? else {
            // Lost the swap to a concurrent transition or delete.
            return Err(Error::InvalidStateTransition(guard.to_string()));
        };

        self.audit
            .record(
                who.principal_id,
                action,
                Some(instance.id),
                format!("Instance \"{}\" {}", instance.name, detail_suffix),
            )
            .await;
        let warning = self.reconcile_after(who.principal_id).await;
        Ok(MutationOutcome { instance, warning })
    }

    pub async fn start(&self, who: &Identity, id: Uuid) -> Result<MutationOutcome> {
        self.lifecycle(
            who,
            id,
            &[
                InstanceStatus::Stopped,
                InstanceStatus::Paused,
                InstanceStatus::Error,
            ],
            InstanceStatus::Running,
            "Instance is already running",
            "Instance Started",
            "started successfully",
        )
        .await
    }

    pub async fn stop(&self, who: &Identity, id: Uuid) -> Result<MutationOutcome> {
        self.lifecycle(
            who,
            id,
            &[
                InstanceStatus::Running,
                InstanceStatus::Paused,
                InstanceStatus::Error,
            ],
            InstanceStatus::Stopped,
            "Instance is already stopped",
            "Instance Stopped",
            "stopped successfully",
        )
        .await
    }

    /// Restart only applies to a running instance and leaves it running.
    pub async fn restart(&self, who: &Identity, id: Uuid) -> Result<MutationOutcome> {
        self.lifecycle(
            who,
            id,
            &[InstanceStatus::Running],
            InstanceStatus::Running,
            "Instance must be running to restart",
            "Instance Restarted",
            "restarted successfully",
        )
        .await
    }

    /// Partial update of name and sizing. Allowed in any lifecycle state.
    pub async fn update(
        &self,
        who: &Identity,
        id: Uuid,
        req: &UpdateInstanceRequest,
    ) -> Result<MutationOutcome> {
        let current = self
            .store
            .instance_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found("Instance"))?;
        policy::require(
            who,
            PolicyAction::Mutate,
            &PolicyTarget::Instance {
                owner_id: current.owner_id,
            },
            "Access denied. You can only update your own instances.",
        )?;
        if let Some(name) = &req.name {
            validate_name(name)?;
        }
        validate_sizing(req.cpu, req.ram, req.storage)?;

        let instance = self
            .store
            .update_instance_fields(
                id,
                req.name.as_deref().map(str::trim),
                req.cpu,
                req.ram,
                req.storage,
            )
            .await?
            .ok_or_else(|| Error::not_found("Instance"))?;

        self.audit
            .record(
                who.principal_id,
                "Instance Updated",
                Some(instance.id),
                format!("Instance \"{}\" updated successfully", instance.name),
            )
            .await;
        let warning = self.reconcile_after(who.principal_id).await;
        Ok(MutationOutcome { instance, warning })
    }

    /// Hard delete, allowed in any state. Snapshots of the instance go with
    /// it; audit entries referencing it stay. Returns the reconcile warning,
    /// if any.
    pub async fn delete(&self, who: &Identity, id: Uuid) -> Result<Option<String>> {
        let instance = self
            .store
            .instance_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found("Instance"))?;
        policy::require(
            who,
            PolicyAction::Delete,
            &PolicyTarget::Instance {
                owner_id: instance.owner_id,
            },
            "Access denied. You can only delete your own instances.",
        )?;
        if !self.store.delete_instance(id).await? {
            return Err(Error::not_found("Instance"));
        }

        self.audit
            .record(
                who.principal_id,
                "Instance Deleted",
                Some(id),
                format!("Instance \"{}\" deleted successfully", instance.name),
            )
            .await;
        Ok(self.reconcile_after(who.principal_id).await)
    }
}
