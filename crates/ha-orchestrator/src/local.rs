use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ha_domain::{Host, HostId, Vm, VmId, VmState, ZoneId};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::OrchestratorError;
use crate::orchestrator::{AlertManager, AlertType, DataStoreDriver, Orchestrator, Planner, ResourceManager, StartParams, VolumeOrchestrator};

/// A stub orchestrator that simulates VM placement locally.
///
/// Mutations are applied to an in-memory registry and logged at `debug`; no
/// real hypervisor is contacted. Used for tests and single-node trial runs.
#[derive(Debug, Default, Clone)]
pub struct LocalOrchestrator {
    vms: Arc<RwLock<HashMap<VmId, Vm>>>,
    hosts: Arc<RwLock<HashMap<HostId, Host>>>,
}

impl LocalOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the registry with a VM, as an external inventory sync would.
    pub async fn seed(&self, vm: Vm) {
        self.vms.write().await.insert(vm.id.clone(), vm);
    }

    /// Seed the registry with a host.
    pub async fn seed_host(&self, host: Host) {
        self.hosts.write().await.insert(host.id.clone(), host);
    }

    /// Remove a host from inventory, as the Ha flow's "record already
    /// removed" branch expects to observe.
    pub async fn remove_host(&self, host_id: &HostId) {
        self.hosts.write().await.remove(host_id);
    }

    async fn mutate(
        &self,
        vm_id: &VmId,
        f: impl FnOnce(&mut Vm),
    ) -> Result<Vm, OrchestratorError> {
        let mut guard = self.vms.write().await;
        let vm = guard
            .get_mut(vm_id)
            .ok_or_else(|| OrchestratorError::ResourceUnavailable(vm_id.to_string()))?;
        f(vm);
        vm.update_time += 1;
        Ok(vm.clone())
    }

    async fn start_with(&self, vm_id: &VmId, params: &StartParams, planner: &dyn Planner) -> Result<Vm, OrchestratorError> {
        let target = planner.place(vm_id, params).await?;
        debug!(vm_id = %vm_id, host_id = %target, planner = planner.name(), "LocalOrchestrator: start");
        self.mutate(vm_id, |vm| {
            vm.last_host_id = vm.host_id.clone();
            vm.host_id = Some(target);
            vm.state = VmState::Running;
        })
        .await
    }
}

#[async_trait]
impl Orchestrator for LocalOrchestrator {
    async fn find_by_id(&self, vm_id: &VmId) -> Result<Option<Vm>, OrchestratorError> {
        Ok(self.vms.read().await.get(vm_id).cloned())
    }

    async fn find_host(&self, host_id: &HostId) -> Result<Option<Host>, OrchestratorError> {
        Ok(self.hosts.read().await.get(host_id).cloned())
    }

    async fn advance_stop(&self, vm_id: &VmId, force: bool) -> Result<Vm, OrchestratorError> {
        debug!(vm_id = %vm_id, force, "LocalOrchestrator: advance_stop");
        self.mutate(vm_id, |vm| vm.state = VmState::Stopped).await
    }

    async fn start_router_for_ha(
        &self,
        vm_id: &VmId,
        params: &StartParams,
        planner: &dyn Planner,
    ) -> Result<Vm, OrchestratorError> {
        self.start_with(vm_id, params, planner).await
    }

    async fn start_proxy_for_ha(
        &self,
        vm_id: &VmId,
        params: &StartParams,
        planner: &dyn Planner,
    ) -> Result<Vm, OrchestratorError> {
        self.start_with(vm_id, params, planner).await
    }

    async fn start_sec_storage_vm_for_ha(
        &self,
        vm_id: &VmId,
        params: &StartParams,
        planner: &dyn Planner,
    ) -> Result<Vm, OrchestratorError> {
        self.start_with(vm_id, params, planner).await
    }

    async fn start_virtual_machine_for_ha(
        &self,
        vm_id: &VmId,
        params: &StartParams,
        planner: &dyn Planner,
    ) -> Result<Vm, OrchestratorError> {
        self.start_with(vm_id, params, planner).await
    }

    async fn migrate_away(&self, vm_id: &VmId, source_host_id: &HostId) -> Result<Vm, OrchestratorError> {
        debug!(vm_id = %vm_id, %source_host_id, "LocalOrchestrator: migrate_away");
        let target = HostId::new(format!("{source_host_id}-migrated"));
        self.mutate(vm_id, |vm| {
            vm.last_host_id = Some(source_host_id.clone());
            vm.host_id = Some(target);
            vm.state = VmState::Running;
        })
        .await
    }

    async fn destroy(&self, vm_id: &VmId, expunge: bool) -> Result<(), OrchestratorError> {
        debug!(vm_id = %vm_id, expunge, "LocalOrchestrator: destroy");
        let mut guard = self.vms.write().await;
        let vm = guard
            .get_mut(vm_id)
            .ok_or_else(|| OrchestratorError::ResourceUnavailable(vm_id.to_string()))?;
        vm.state = if expunge { VmState::Expunging } else { VmState::Destroyed };
        Ok(())
    }

    async fn is_root_volume_on_local_storage(&self, _vm_id: &VmId) -> Result<bool, OrchestratorError> {
        Ok(false)
    }
}

#[async_trait]
impl VolumeOrchestrator for LocalOrchestrator {
    async fn can_vm_restart_on_another_server(&self, _vm_id: &VmId) -> Result<bool, OrchestratorError> {
        Ok(true)
    }
}

#[async_trait]
impl DataStoreDriver for LocalOrchestrator {
    async fn detach_volume_from_all_storage_nodes(&self, vm_id: &VmId) -> Result<(), OrchestratorError> {
        debug!(vm_id = %vm_id, "LocalOrchestrator: detach_volume_from_all_storage_nodes");
        Ok(())
    }
}

#[async_trait]
impl ResourceManager for LocalOrchestrator {
    async fn migrate_away_failed(&self, host_id: &HostId, vm_id: &VmId) -> Result<(), OrchestratorError> {
        debug!(%host_id, vm_id = %vm_id, "LocalOrchestrator: migrate_away_failed");
        Ok(())
    }
}

#[async_trait]
impl AlertManager for LocalOrchestrator {
    async fn send_alert(
        &self,
        alert_type: AlertType,
        zone_id: &ZoneId,
        pod_id: Option<&str>,
        subject: &str,
        body: &str,
    ) -> Result<(), OrchestratorError> {
        debug!(?alert_type, %zone_id, pod_id, subject, body, "LocalOrchestrator: send_alert");
        Ok(())
    }
}

/// Deterministic planner that always places on a fixed host, for tests and
/// trial runs where no real capacity model exists.
#[derive(Debug, Clone)]
pub struct FixedPlanner {
    name: String,
    host_id: HostId,
}

impl FixedPlanner {
    pub fn new(name: impl Into<String>, host_id: HostId) -> Self {
        Self { name: name.into(), host_id }
    }
}

#[async_trait]
impl Planner for FixedPlanner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn place(&self, _vm_id: &VmId, _params: &StartParams) -> Result<HostId, OrchestratorError> {
        Ok(self.host_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_domain::InstanceType;

    fn dummy_vm(id: &str, state: VmState) -> Vm {
        Vm {
            id: VmId::new(id),
            instance_type: InstanceType::User,
            state,
            host_id: Some(HostId::new("host-1")),
            last_host_id: None,
            zone_id: ZoneId::new("zone-1"),
            update_time: 1,
            ha_enabled: true,
        }
    }

    #[tokio::test]
    async fn advance_stop_transitions_to_stopped() {
        let orch = LocalOrchestrator::new();
        orch.seed(dummy_vm("vm-1", VmState::Running)).await;

        let vm = orch.advance_stop(&VmId::new("vm-1"), true).await.unwrap();
        assert_eq!(vm.state, VmState::Stopped);
    }

    #[tokio::test]
    async fn advance_start_dispatches_by_instance_type_and_uses_planner() {
        let orch = LocalOrchestrator::new();
        orch.seed(dummy_vm("vm-1", VmState::Stopped)).await;
        let planner = FixedPlanner::new("ordinary", HostId::new("host-2"));

        let vm = orch
            .advance_start(&VmId::new("vm-1"), &StartParams::default(), &planner)
            .await
            .unwrap();
        assert_eq!(vm.state, VmState::Running);
        assert_eq!(vm.host_id, Some(HostId::new("host-2")));
    }

    #[tokio::test]
    async fn destroy_distinguishes_expunge_from_plain_destroy() {
        let orch = LocalOrchestrator::new();
        orch.seed(dummy_vm("vm-1", VmState::Running)).await;

        orch.destroy(&VmId::new("vm-1"), true).await.unwrap();
        let vm = orch.find_by_id(&VmId::new("vm-1")).await.unwrap().unwrap();
        assert_eq!(vm.state, VmState::Expunging);
    }

    #[tokio::test]
    async fn find_by_id_on_unknown_vm_returns_none() {
        let orch = LocalOrchestrator::new();
        assert!(orch.find_by_id(&VmId::new("ghost")).await.unwrap().is_none());
    }
}
