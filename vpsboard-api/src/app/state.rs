use std::sync::Arc;

use vpsboard_core::audit::AuditService;
use vpsboard_core::ledger::LedgerService;
use vpsboard_core::registry::RegistryService;
use vpsboard_core::snapshots::SnapshotService;
use vpsboard_core::Store;

/// Shared handler state: the storage backend plus the domain services
/// wired on top of it.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub registry: RegistryService,
    pub ledger: LedgerService,
    pub snapshots: SnapshotService,
    pub audit: AuditService,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>) -> Arc<Self> {
        let audit = AuditService::new(store.clone());
        let ledger = LedgerService::new(store.clone(), audit.clone());
        let registry = RegistryService::new(store.clone(), ledger.clone(), audit.clone());
        let snapshots = SnapshotService::new(store.clone(), audit.clone());
        Arc::new(AppState {
            store,
            registry,
            ledger,
            snapshots,
            audit,
        })
    }
}
