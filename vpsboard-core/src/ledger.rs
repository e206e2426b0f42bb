//! Fleet-wide capacity ledger: declared totals and used amounts.
//!
//! The ledger is a single aggregate row. Reads lazily create it with
//! defaults; reconcile recomputes the used side from running instances and
//! refuses to invent a row that an admin never configured.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use vpsboard_common::{
    limits, CapacityLedger, Efficiency, Error, FleetSummary, InstanceStatus, LedgerOverview,
    Recommendations, ReconcileReport, ResourceStats, Result, UpdateResourcesRequest, UsageTriple,
    Utilization,
};

use crate::audit::AuditService;
use crate::policy::{self, Identity, PolicyAction, PolicyTarget};
use crate::store::Store;

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn percent(used: i32, total: i32) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    round2(used as f64 / total as f64 * 100.0)
}

/// Percent utilization and remaining headroom for a ledger row. Available
/// amounts go negative when used exceeds the declared total; that is
/// surfaced as-is rather than clamped.
pub fn utilization(ledger: &CapacityLedger) -> Utilization {
    Utilization {
        cpu_usage: percent(ledger.used_cpu, ledger.total_cpu),
        ram_usage: percent(ledger.used_ram, ledger.total_ram),
        storage_usage: percent(ledger.used_storage, ledger.total_storage),
        available_cpu: ledger.total_cpu - ledger.used_cpu,
        available_ram: ledger.total_ram - ledger.used_ram,
        available_storage: ledger.total_storage - ledger.used_storage,
    }
}

/// Validates the declared totals of an update request.
pub fn apply_bounds(req: &UpdateResourcesRequest) -> Result<()> {
    if let Some(cpu) = req.total_cpu {
        if !(limits::TOTAL_CPU_MIN..=limits::TOTAL_CPU_MAX).contains(&cpu) {
            return Err(Error::InvalidRange(
                "Total CPU must be between 1 and 128".to_string(),
            ));
        }
    }
    if let Some(ram) = req.total_ram {
        if !(limits::TOTAL_RAM_MIN..=limits::TOTAL_RAM_MAX).contains(&ram) {
            return Err(Error::InvalidRange(
                "Total RAM must be between 1024MB and 131072MB (128GB)".to_string(),
            ));
        }
    }
    if let Some(storage) = req.total_storage {
        if !(limits::TOTAL_STORAGE_MIN..=limits::TOTAL_STORAGE_MAX).contains(&storage) {
            return Err(Error::InvalidRange(
                "Total Storage must be between 100GB and 10240GB (10TB)".to_string(),
            ));
        }
    }
    Ok(())
}

fn recommendation(resource: &str, efficiency: f64) -> String {
    if efficiency > 80.0 {
        format!("Consider adding more {resource} resources")
    } else {
        format!("{resource} usage is optimal")
    }
}

#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn Store>,
    audit: AuditService,
}

impl LedgerService {
    pub fn new(store: Arc<dyn Store>, audit: AuditService) -> Self {
        LedgerService { store, audit }
    }

    /// Ledger row plus derived utilization, the actual footprint of running
    /// instances and a per-status fleet summary. Creates the row with
    /// defaults on first read.
    pub async fn current(&self, who: &Identity) -> Result<LedgerOverview> {
        policy::require(
            who,
            PolicyAction::View,
            &PolicyTarget::Fleet,
            "Access denied",
        )?;
        let resource = match self.store.ledger().await? {
            Some(row) => row,
            None => {
                let defaults = CapacityLedger::with_defaults();
                self.store.insert_ledger(&defaults).await?;
                defaults
            }
        };
        let usage = utilization(&resource);
        let actual_usage = self.store.running_usage().await?;
        let mut summary = FleetSummary {
            total_instances: 0,
            running: 0,
            stopped: 0,
            paused: 0,
            error: 0,
        };
        for aggregate in self.store.status_aggregates().await? {
            summary.total_instances += aggregate.count;
            match aggregate.status {
                InstanceStatus::Running => summary.running = aggregate.count,
                InstanceStatus::Stopped => summary.stopped = aggregate.count,
                InstanceStatus::Paused => summary.paused = aggregate.count,
                InstanceStatus::Error => summary.error = aggregate.count,
            }
        }
        Ok(LedgerOverview {
            resource,
            usage,
            actual_usage,
            summary,
        })
    }

    /// Admin-only manual override of totals and used amounts. Creates the
    /// row when none exists; totals are validated, used amounts are taken
    /// verbatim and the next reconcile pass will overwrite them.
    pub async fn update(
        &self,
        who: &Identity,
        req: &UpdateResourcesRequest,
    ) -> Result<CapacityLedger> {
        policy::require(
            who,
            PolicyAction::Mutate,
            &PolicyTarget::Fleet,
            "Admin access required",
        )?;
        apply_bounds(req)?;

        let existing = self.store.ledger().await?;
        let fresh = existing.is_none();
        let mut ledger = existing.unwrap_or_else(CapacityLedger::with_defaults);
        if let Some(cpu) = req.total_cpu {
            ledger.total_cpu = cpu;
        }
        if let Some(ram) = req.total_ram {
            ledger.total_ram = ram;
        }
        if let Some(storage) = req.total_storage {
            ledger.total_storage = storage;
        }
        if let Some(cpu) = req.used_cpu {
            ledger.used_cpu = cpu;
        }
        if let Some(ram) = req.used_ram {
            ledger.used_ram = ram;
        }
        if let Some(storage) = req.used_storage {
            ledger.used_storage = storage;
        }
        ledger.last_updated = Utc::now();
        if fresh {
            self.store.insert_ledger(&ledger).await?;
        } else {
            self.store.update_ledger(&ledger).await?;
        }

        self.audit
            .record(
                who.principal_id,
                "Resources Updated",
                None,
                format!(
                    "System resources updated: CPU={}, RAM={}MB, Storage={}GB",
                    ledger.total_cpu, ledger.total_ram, ledger.total_storage
                ),
            )
            .await;
        Ok(ledger)
    }

    /// Admin-triggered reconcile pass.
    pub async fn reconcile(&self, who: &Identity) -> Result<ReconcileReport> {
        policy::require(
            who,
            PolicyAction::Mutate,
            &PolicyTarget::Fleet,
            "Admin access required",
        )?;
        self.reconcile_as(who.principal_id).await
    }

    /// Recomputes used amounts from instances currently running and writes
    /// them back. Idempotent: a second pass over unchanged instances is a
    /// no-op on the used side. Fails with `NotConfigured` when no ledger
    /// row exists; reconcile never invents configuration.
    pub(crate) async fn reconcile_as(&self, actor: Uuid) -> Result<ReconcileReport> {
        let Some(mut ledger) = self.store.ledger().await? else {
            return Err(Error::NotConfigured(
                "No resource configuration found".to_string(),
            ));
        };
        let actual = self.store.running_usage().await?;
        let previous_usage = UsageTriple {
            cpu: ledger.used_cpu,
            ram: ledger.used_ram,
            storage: ledger.used_storage,
        };
        ledger.used_cpu = actual.cpu as i32;
        ledger.used_ram = actual.ram as i32;
        ledger.used_storage = actual.storage as i32;
        ledger.last_updated = Utc::now();
        self.store.update_ledger(&ledger).await?;

        self.audit
            .record(
                actor,
                "Resource Usage Auto-Updated",
                None,
                format!(
                    "Resource usage auto-updated: CPU={}, RAM={}MB, Storage={}GB",
                    ledger.used_cpu, ledger.used_ram, ledger.used_storage
                ),
            )
            .await;
        let new_usage = UsageTriple {
            cpu: ledger.used_cpu,
            ram: ledger.used_ram,
            storage: ledger.used_storage,
        };
        Ok(ReconcileReport {
            resource: ledger,
            previous_usage,
            new_usage,
            running_count: actual.running_count,
        })
    }

    /// Utilization, per-status breakdown, efficiency percentages and sizing
    /// recommendations. Unlike `current`, this does not create the row.
    pub async fn stats(&self, who: &Identity) -> Result<ResourceStats> {
        policy::require(
            who,
            PolicyAction::View,
            &PolicyTarget::Fleet,
            "Access denied",
        )?;
        let Some(resource) = self.store.ledger().await? else {
            return Err(Error::NotFound(
                "No resource information found".to_string(),
            ));
        };
        let usage = utilization(&resource);
        let by_status = self.store.status_aggregates().await?;
        let efficiency = Efficiency {
            cpu_efficiency: usage.cpu_usage,
            ram_efficiency: usage.ram_usage,
            storage_efficiency: usage.storage_usage,
            overall_efficiency: round2(
                (usage.cpu_usage + usage.ram_usage + usage.storage_usage) / 3.0,
            ),
        };
        let recommendations = Recommendations {
            cpu: recommendation("CPU", efficiency.cpu_efficiency),
            ram: recommendation("RAM", efficiency.ram_efficiency),
            storage: recommendation("Storage", efficiency.storage_efficiency),
        };
        Ok(ResourceStats {
            resource,
            usage,
            by_status,
            efficiency,
            recommendations,
        })
    }
}
