use async_trait::async_trait;
use ha_domain::{FenceResult, Host, Vm};

use crate::error::CoordinatorError;

/// Isolates a lost VM from shared storage and network so it is safe to
/// restart elsewhere. Fencers are consulted in order; the first `Success`
/// wins. `NotApplicable` means this fencer has no opinion for this
/// host/VM pair, not that fencing failed.
#[async_trait]
pub trait Fencer: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn fence(&self, vm: &Vm, host: &Host) -> Result<FenceResult, CoordinatorError>;
}

/// Consult `fencers` in order; require at least one `Success`.
pub async fn fence_vm(
    fencers: &[std::sync::Arc<dyn Fencer>],
    vm: &Vm,
    host: &Host,
) -> Result<bool, CoordinatorError> {
    for fencer in fencers {
        if fencer.fence(vm, host).await? == FenceResult::Success {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Deterministic fencer that always succeeds, for tests and trial runs with
/// no real isolation mechanism to model.
#[derive(Debug, Default, Clone)]
pub struct AlwaysSucceedsFencer;

#[async_trait]
impl Fencer for AlwaysSucceedsFencer {
    fn name(&self) -> &str {
        "always-succeeds"
    }

    async fn fence(&self, _vm: &Vm, _host: &Host) -> Result<FenceResult, CoordinatorError> {
        Ok(FenceResult::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_domain::{HostId, InstanceType, VmId, VmState, ZoneId};
    use std::sync::Arc;

    struct FixedFencer(FenceResult);

    #[async_trait]
    impl Fencer for FixedFencer {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn fence(&self, _vm: &Vm, _host: &Host) -> Result<FenceResult, CoordinatorError> {
            Ok(self.0)
        }
    }

    fn vm() -> Vm {
        Vm {
            id: VmId::new("vm-1"),
            instance_type: InstanceType::User,
            state: VmState::Running,
            host_id: Some(HostId::new("host-1")),
            last_host_id: None,
            zone_id: ZoneId::new("zone-1"),
            update_time: 1,
            ha_enabled: true,
        }
    }

    fn host() -> Host {
        Host {
            id: HostId::new("host-1"),
            zone_id: ZoneId::new("zone-1"),
            hypervisor: "kvm".into(),
            is_routing_only: false,
        }
    }

    #[tokio::test]
    async fn first_success_wins() {
        let fencers: Vec<Arc<dyn Fencer>> = vec![
            Arc::new(FixedFencer(FenceResult::NotApplicable)),
            Arc::new(FixedFencer(FenceResult::Failure)),
            Arc::new(FixedFencer(FenceResult::Success)),
        ];
        assert!(fence_vm(&fencers, &vm(), &host()).await.unwrap());
    }

    #[tokio::test]
    async fn no_success_fails() {
        let fencers: Vec<Arc<dyn Fencer>> = vec![
            Arc::new(FixedFencer(FenceResult::NotApplicable)),
            Arc::new(FixedFencer(FenceResult::Failure)),
        ];
        assert!(!fence_vm(&fencers, &vm(), &host()).await.unwrap());
    }
}
