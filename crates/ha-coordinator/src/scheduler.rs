use std::sync::Arc;

use ha_config::HaConfig;
use ha_domain::{Host, HostId, HostStatus, InstanceType, ReasonType, Step, Vm, VmId, VmState, WorkItem, WorkType};
use ha_orchestrator::{AlertManager, AlertType, Orchestrator};
use ha_store::WorkItemStore;
use tokio::sync::Notify;
use tracing::warn;

use crate::gate::FeatureGate;
use crate::investigate::{investigate_host, Investigator};
use crate::scheduler_types::{ScheduleError, StatusCount, StatusReport};

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

const STOP_FAMILY: [WorkType; 3] = [WorkType::Stop, WorkType::CheckStop, WorkType::ForceStop];

/// Public entry point the rest of the management plane calls to enqueue
/// HA-relevant work. Every operation persists at most one `WorkItem` then
/// wakes the worker pool.
pub struct SchedulerApi {
    server_id: String,
    store: Arc<dyn WorkItemStore>,
    config: Arc<HaConfig>,
    gate: FeatureGate,
    orchestrator: Arc<dyn Orchestrator>,
    investigators: Vec<Arc<dyn Investigator>>,
    alert_manager: Arc<dyn AlertManager>,
    notify: Arc<Notify>,
}

impl SchedulerApi {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        server_id: impl Into<String>,
        store: Arc<dyn WorkItemStore>,
        config: Arc<HaConfig>,
        orchestrator: Arc<dyn Orchestrator>,
        investigators: Vec<Arc<dyn Investigator>>,
        alert_manager: Arc<dyn AlertManager>,
        notify: Arc<Notify>,
    ) -> Self {
        let gate = FeatureGate::new(config.clone());
        Self {
            server_id: server_id.into(),
            store,
            config,
            gate,
            orchestrator,
            investigators,
            alert_manager,
            notify,
        }
    }

    fn wakeup(&self) {
        self.notify.notify_waiters();
    }

    /// Synchronous host investigation. `Alert` when the host is unrecognized
    /// by every investigator or the zone's feature gate is off.
    pub async fn investigate(&self, host: &Host) -> Result<HostStatus, ScheduleError> {
        if !self.gate.is_enabled(&host.zone_id) {
            return Ok(HostStatus::Alert);
        }
        match investigate_host(&self.investigators, host).await {
            Ok(HostStatus::Unknown) | Err(_) => Ok(HostStatus::Alert),
            Ok(status) => Ok(status),
        }
    }

    /// Schedule restarts for every HA-eligible VM on a failed host.
    pub async fn schedule_restart_for_vms_on_host(
        &self,
        host: &Host,
        vms: &[Vm],
        investigate: bool,
        reason_type: ReasonType,
    ) -> Result<(), ScheduleError> {
        if host.is_routing_only || self.config.has_host_side_ha(&host.hypervisor) {
            return Ok(());
        }

        let mut eligible: Vec<&Vm> = Vec::new();
        for vm in vms {
            match self.orchestrator.is_root_volume_on_local_storage(&vm.id).await {
                Ok(true) => continue,
                Ok(false) => eligible.push(vm),
                Err(e) => {
                    warn!(vm_id = %vm.id, error = %e, "could not determine storage locality, scheduling anyway");
                    eligible.push(vm);
                }
            }
        }
        // System VMs first so routers/proxies come back before user workloads.
        eligible.sort_by_key(|vm| !vm.instance_type.is_system_vm());

        for vm in &eligible {
            self.schedule_restart(vm, investigate, reason_type).await?;
        }

        if self.gate.is_enabled(&host.zone_id) && self.gate.alerts_enabled(&host.zone_id) {
            let _ = self
                .alert_manager
                .send_alert(
                    AlertType::HostDown,
                    &host.zone_id,
                    None,
                    &format!("host {} is down", host.id),
                    &format!("{} VMs scheduled for restart", eligible.len()),
                )
                .await;
        }
        Ok(())
    }

    /// Schedule a single VM's restart, carrying forward its retry count if
    /// it is flapping within `time_between_failures`.
    pub async fn schedule_restart(
        &self,
        vm: &Vm,
        investigate: bool,
        reason_type: ReasonType,
    ) -> Result<(), ScheduleError> {
        if !self.gate.is_enabled(&vm.zone_id) {
            return Ok(());
        }

        if vm.host_id.is_none() && !investigate {
            let _ = self.orchestrator.advance_stop(&vm.id, true).await;
        }

        // Read the prior incident before persisting the new one — otherwise
        // this query would just find the item we are about to create.
        let previous = self.store.find_previous_ha(&vm.id).await?;

        let item = WorkItem::new(
            vm.id.clone(),
            vm.instance_type,
            WorkType::Ha,
            vm.host_id.clone(),
            vm.state,
            vm.update_time,
            reason_type,
            now_secs(),
        );
        let mut persisted = self.store.persist(item).await?;

        if let Some(previous) = previous {
            let can_schedule_new = now_secs().saturating_sub(previous.created_at)
                >= self.config.time_between_failures;
            if previous.times_tried > 0 && !can_schedule_new {
                persisted.times_tried = previous.times_tried;
                self.store.update(&persisted).await?;
            }
        }

        self.wakeup();
        Ok(())
    }

    /// Schedule a stop-family item. Rejects a duplicate non-terminal item
    /// for the same `(vm, work_type)`.
    pub async fn schedule_stop(
        &self,
        vm: &Vm,
        host_id: Option<&HostId>,
        work_type: WorkType,
        reason_type: ReasonType,
    ) -> Result<(), ScheduleError> {
        if !STOP_FAMILY.contains(&work_type) {
            return Err(ScheduleError::InvalidStopWorkType { work_type });
        }
        if self.store.has_been_scheduled(&vm.id, work_type).await? {
            return Err(ScheduleError::AlreadyScheduled);
        }

        let item = WorkItem::new(
            vm.id.clone(),
            vm.instance_type,
            work_type,
            host_id.cloned().or_else(|| vm.host_id.clone()),
            vm.state,
            vm.update_time,
            reason_type,
            now_secs(),
        );
        self.store.persist(item).await?;
        self.wakeup();
        Ok(())
    }

    /// Schedule a migration. A no-op when the VM has no current host.
    pub async fn schedule_migration(&self, vm: &Vm, reason_type: ReasonType) -> Result<(), ScheduleError> {
        let Some(source) = (if vm.state == VmState::Migrating {
            vm.last_host_id.clone()
        } else {
            vm.host_id.clone()
        }) else {
            return Ok(());
        };

        let item = WorkItem::new(
            vm.id.clone(),
            vm.instance_type,
            WorkType::Migration,
            Some(source),
            vm.state,
            vm.update_time,
            reason_type,
            now_secs(),
        );
        self.store.persist(item).await?;
        self.wakeup();
        Ok(())
    }

    pub async fn schedule_destroy(
        &self,
        vm: &Vm,
        host_id: Option<&HostId>,
        reason_type: ReasonType,
    ) -> Result<(), ScheduleError> {
        let item = WorkItem::new(
            vm.id.clone(),
            vm.instance_type,
            WorkType::Destroy,
            host_id.cloned().or_else(|| vm.host_id.clone()),
            vm.state,
            vm.update_time,
            reason_type,
            now_secs(),
        );
        self.store.persist(item).await?;
        self.wakeup();
        Ok(())
    }

    pub async fn cancel_destroy(&self, vm: &Vm, _host_id: Option<&HostId>) -> Result<(), ScheduleError> {
        self.store.delete(&vm.id, WorkType::Destroy).await?;
        Ok(())
    }

    /// Cancel pending migration-family work for a host taken out of
    /// service, scoped to items this peer owns.
    pub async fn cancel_scheduled_migrations(&self, host: &Host) -> Result<(), ScheduleError> {
        let work_type = if host.is_routing_only { WorkType::Stop } else { WorkType::Migration };
        self.store
            .delete_migration_work_items(&host.id, work_type, &self.server_id)
            .await?;
        Ok(())
    }

    pub async fn find_taken_migration_work(&self) -> Result<Vec<Vm>, ScheduleError> {
        let items = self.store.find_taken_work_items(WorkType::Migration).await?;
        let mut vms = Vec::with_capacity(items.len());
        for item in items {
            if let Ok(Some(vm)) = self.orchestrator.find_by_id(&item.instance_id).await {
                vms.push(vm);
            }
        }
        Ok(vms)
    }

    pub async fn expunge_work_items_by_vm_list(
        &self,
        vm_ids: &[VmId],
        batch_size: usize,
    ) -> Result<usize, ScheduleError> {
        Ok(self.store.expunge_by_vm_list(vm_ids, batch_size).await?)
    }

    /// Summarize the queue by `(work_type, step)`, for the CLI's `status` command.
    pub async fn status(&self) -> Result<StatusReport, ScheduleError> {
        let items = self.store.list_all().await?;
        let mut counts: std::collections::HashMap<(WorkType, Step), usize> = std::collections::HashMap::new();
        for item in &items {
            *counts.entry((item.work_type, item.step)).or_default() += 1;
        }
        let mut counts: Vec<StatusCount> = counts
            .into_iter()
            .map(|((work_type, step), count)| StatusCount { work_type, step, count })
            .collect();
        counts.sort_by_key(|c| (c.work_type.to_string(), c.step.to_string()));
        Ok(StatusReport { counts })
    }
}
