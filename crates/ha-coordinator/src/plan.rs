use std::sync::Arc;

use ha_domain::{Vm, VmId};
use ha_orchestrator::{Orchestrator, OrchestratorError, Planner, StartParams};

/// Attempt to start `vm_id` with its ordinary planner; on `InsufficientCapacity`
/// retry once with the first configured HA planner. Never more than two
/// placement attempts per execution slot.
pub async fn start_with_fallback(
    orchestrator: &Arc<dyn Orchestrator>,
    ordinary: &Arc<dyn Planner>,
    ha_planners: &[Arc<dyn Planner>],
    vm_id: &VmId,
    params: &StartParams,
) -> Result<Vm, OrchestratorError> {
    match orchestrator.advance_start(vm_id, params, ordinary.as_ref()).await {
        Err(OrchestratorError::InsufficientCapacity(_)) => {
            let fallback = ha_planners
                .first()
                .ok_or_else(|| OrchestratorError::InsufficientCapacity(vm_id.to_string()))?;
            orchestrator.advance_start(vm_id, params, fallback.as_ref()).await
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ha_domain::{HostId, InstanceType, VmState, ZoneId};

    struct AlwaysFull;
    #[async_trait]
    impl Planner for AlwaysFull {
        fn name(&self) -> &str {
            "always-full"
        }
        async fn place(&self, vm_id: &VmId, _params: &StartParams) -> Result<HostId, OrchestratorError> {
            Err(OrchestratorError::InsufficientCapacity(vm_id.to_string()))
        }
    }

    struct AlwaysFits(HostId);
    #[async_trait]
    impl Planner for AlwaysFits {
        fn name(&self) -> &str {
            "always-fits"
        }
        async fn place(&self, _vm_id: &VmId, _params: &StartParams) -> Result<HostId, OrchestratorError> {
            Ok(self.0.clone())
        }
    }

    fn dummy_vm() -> Vm {
        Vm {
            id: VmId::new("vm-1"),
            instance_type: InstanceType::User,
            state: VmState::Stopped,
            host_id: Some(HostId::new("host-1")),
            last_host_id: None,
            zone_id: ZoneId::new("zone-1"),
            update_time: 1,
            ha_enabled: true,
        }
    }

    #[tokio::test]
    async fn falls_back_to_ha_planner_on_insufficient_capacity() {
        let local = Arc::new(ha_orchestrator::LocalOrchestrator::new());
        local.seed(dummy_vm()).await;
        let orchestrator: Arc<dyn Orchestrator> = local;

        let ordinary: Arc<dyn Planner> = Arc::new(AlwaysFull);
        let ha: Vec<Arc<dyn Planner>> = vec![Arc::new(AlwaysFits(HostId::new("host-2")))];

        let vm = start_with_fallback(&orchestrator, &ordinary, &ha, &VmId::new("vm-1"), &StartParams::default())
            .await
            .unwrap();
        assert_eq!(vm.host_id, Some(HostId::new("host-2")));
    }
}
