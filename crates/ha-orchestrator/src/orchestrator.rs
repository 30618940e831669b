use async_trait::async_trait;
use ha_domain::{HostId, InstanceType, VmId};

use crate::error::OrchestratorError;

/// Parameters the state machine hands to a start call. `ha_tag` is injected
/// into the request when configured, so operators can tell HA-triggered
/// starts apart from ordinary ones downstream.
#[derive(Debug, Clone, Default)]
pub struct StartParams {
    pub ha_tag: Option<String>,
}

/// The category an alert belongs to, derived from the VM type and situation
/// that triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertType {
    HostDown,
    GateDisabled,
    FenceFailure,
    RestartFailure,
    MigrationFailure,
}

/// Picks a target host for a VM that needs to start or relocate. Ordinary
/// placement and HA placement are both instances of this trait; the
/// recovery state machine decides which one(s) to consult and in what order.
#[async_trait]
pub trait Planner: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn place(&self, vm_id: &VmId, params: &StartParams) -> Result<HostId, OrchestratorError>;
}

/// The VM orchestrator: the single external collaborator that actually
/// mutates VM placement. One logical implementation is expected in
/// production; `LocalOrchestrator` stands in for it in tests.
#[async_trait]
pub trait Orchestrator: Send + Sync + 'static {
    async fn find_by_id(&self, vm_id: &VmId) -> Result<Option<ha_domain::Vm>, OrchestratorError>;

    /// Looks up the host record the state machine consults for hypervisor
    /// family, zone, and routing-only status. `None` when the host has
    /// already been removed from inventory.
    async fn find_host(&self, host_id: &HostId) -> Result<Option<ha_domain::Host>, OrchestratorError>;

    async fn advance_stop(&self, vm_id: &VmId, force: bool) -> Result<ha_domain::Vm, OrchestratorError>;

    /// Dispatches to the type-specific starter based on the VM's current
    /// `instance_type`. Implementors normally get this for free by
    /// implementing the four `start_*_for_ha` methods below.
    async fn advance_start(
        &self,
        vm_id: &VmId,
        params: &StartParams,
        planner: &dyn Planner,
    ) -> Result<ha_domain::Vm, OrchestratorError> {
        let vm = self
            .find_by_id(vm_id)
            .await?
            .ok_or_else(|| OrchestratorError::ResourceUnavailable(vm_id.to_string()))?;
        match vm.instance_type {
            InstanceType::DomainRouter => self.start_router_for_ha(vm_id, params, planner).await,
            InstanceType::ConsoleProxy => self.start_proxy_for_ha(vm_id, params, planner).await,
            InstanceType::SecondaryStorageVm => {
                self.start_sec_storage_vm_for_ha(vm_id, params, planner).await
            }
            InstanceType::User | InstanceType::Other => {
                self.start_virtual_machine_for_ha(vm_id, params, planner).await
            }
        }
    }

    async fn start_router_for_ha(
        &self,
        vm_id: &VmId,
        params: &StartParams,
        planner: &dyn Planner,
    ) -> Result<ha_domain::Vm, OrchestratorError>;

    async fn start_proxy_for_ha(
        &self,
        vm_id: &VmId,
        params: &StartParams,
        planner: &dyn Planner,
    ) -> Result<ha_domain::Vm, OrchestratorError>;

    async fn start_sec_storage_vm_for_ha(
        &self,
        vm_id: &VmId,
        params: &StartParams,
        planner: &dyn Planner,
    ) -> Result<ha_domain::Vm, OrchestratorError>;

    async fn start_virtual_machine_for_ha(
        &self,
        vm_id: &VmId,
        params: &StartParams,
        planner: &dyn Planner,
    ) -> Result<ha_domain::Vm, OrchestratorError>;

    async fn migrate_away(
        &self,
        vm_id: &VmId,
        source_host_id: &HostId,
    ) -> Result<ha_domain::Vm, OrchestratorError>;

    async fn destroy(&self, vm_id: &VmId, expunge: bool) -> Result<(), OrchestratorError>;

    async fn is_root_volume_on_local_storage(&self, vm_id: &VmId) -> Result<bool, OrchestratorError>;
}

/// Volume-placement capability, consulted before restart to decide whether a
/// VM can move off its current host at all.
#[async_trait]
pub trait VolumeOrchestrator: Send + Sync + 'static {
    async fn can_vm_restart_on_another_server(&self, vm_id: &VmId) -> Result<bool, OrchestratorError>;
}

/// Primary-storage capability for pools that require an explicit detach
/// before a VM can attach its volumes on a new host.
#[async_trait]
pub trait DataStoreDriver: Send + Sync + 'static {
    async fn detach_volume_from_all_storage_nodes(&self, vm_id: &VmId) -> Result<(), OrchestratorError>;
}

/// Capacity bookkeeping for hosts a migration gave up on.
#[async_trait]
pub trait ResourceManager: Send + Sync + 'static {
    async fn migrate_away_failed(&self, host_id: &HostId, vm_id: &VmId) -> Result<(), OrchestratorError>;
}

/// Operator-facing notification sink.
#[async_trait]
pub trait AlertManager: Send + Sync + 'static {
    async fn send_alert(
        &self,
        alert_type: AlertType,
        zone_id: &ha_domain::ZoneId,
        pod_id: Option<&str>,
        subject: &str,
        body: &str,
    ) -> Result<(), OrchestratorError>;
}
