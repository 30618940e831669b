use async_trait::async_trait;
use ha_domain::{Host, HostStatus, Vm, VmLiveness};

use crate::error::CoordinatorError;

/// An oracle that reports whether a host or VM is still alive. Investigators
/// are consulted in registration order; the first one that returns a
/// non-`Unknown` answer wins.
#[async_trait]
pub trait Investigator: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn is_agent_alive(&self, host: &Host) -> Result<HostStatus, CoordinatorError>;

    /// `Unknown` means "keep trying the next investigator", not "it is dead".
    async fn is_vm_alive(&self, vm: &Vm, host: &Host) -> Result<VmLiveness, CoordinatorError>;
}

/// Consult `investigators` in order and return the first non-`Unknown`
/// verdict on the VM's liveness. `Unknown` if every investigator abstains.
pub async fn investigate_vm(
    investigators: &[std::sync::Arc<dyn Investigator>],
    vm: &Vm,
    host: &Host,
) -> Result<VmLiveness, CoordinatorError> {
    for investigator in investigators {
        let verdict = investigator.is_vm_alive(vm, host).await?;
        if verdict != VmLiveness::Unknown {
            return Ok(verdict);
        }
    }
    Ok(VmLiveness::Unknown)
}

/// Consult `investigators` in order and return the first non-`Unknown`
/// verdict on the host's agent status.
pub async fn investigate_host(
    investigators: &[std::sync::Arc<dyn Investigator>],
    host: &Host,
) -> Result<HostStatus, CoordinatorError> {
    for investigator in investigators {
        let verdict = investigator.is_agent_alive(host).await?;
        if verdict != HostStatus::Unknown {
            return Ok(verdict);
        }
    }
    Ok(HostStatus::Unknown)
}

/// Deterministic investigator that always abstains. Useful as the sole
/// configured investigator in a trial deployment where fencing, not
/// investigation, is expected to make the call.
#[derive(Debug, Default, Clone)]
pub struct AbstainingInvestigator;

#[async_trait]
impl Investigator for AbstainingInvestigator {
    fn name(&self) -> &str {
        "abstaining"
    }

    async fn is_agent_alive(&self, _host: &Host) -> Result<HostStatus, CoordinatorError> {
        Ok(HostStatus::Unknown)
    }

    async fn is_vm_alive(&self, _vm: &Vm, _host: &Host) -> Result<VmLiveness, CoordinatorError> {
        Ok(VmLiveness::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_domain::{HostId, InstanceType, VmId, VmState, ZoneId};
    use std::sync::Arc;

    struct FixedInvestigator(&'static str, VmLiveness, HostStatus);

    #[async_trait]
    impl Investigator for FixedInvestigator {
        fn name(&self) -> &str {
            self.0
        }

        async fn is_agent_alive(&self, _host: &Host) -> Result<HostStatus, CoordinatorError> {
            Ok(self.2)
        }

        async fn is_vm_alive(&self, _vm: &Vm, _host: &Host) -> Result<VmLiveness, CoordinatorError> {
            Ok(self.1)
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
    async fn first_non_unknown_answer_wins() {
        let investigators: Vec<Arc<dyn Investigator>> = vec![
            Arc::new(FixedInvestigator("a", VmLiveness::Unknown, HostStatus::Unknown)),
            Arc::new(FixedInvestigator("b", VmLiveness::Dead, HostStatus::Down)),
            Arc::new(FixedInvestigator("c", VmLiveness::Alive, HostStatus::Up)),
        ];
        let verdict = investigate_vm(&investigators, &vm(), &host()).await.unwrap();
        assert_eq!(verdict, VmLiveness::Dead);
    }

    #[tokio::test]
    async fn all_unknown_stays_unknown() {
        let investigators: Vec<Arc<dyn Investigator>> =
            vec![Arc::new(AbstainingInvestigator), Arc::new(AbstainingInvestigator)];
        let verdict = investigate_vm(&investigators, &vm(), &host()).await.unwrap();
        assert_eq!(verdict, VmLiveness::Unknown);
    }
}
