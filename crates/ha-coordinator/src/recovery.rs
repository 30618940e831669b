use std::sync::Arc;

use ha_config::HaConfig;
use ha_domain::{
    Host, HostStatus, ReasonType, Step, Vm, VmLiveness, VmState, WorkItem, WorkType,
};
use ha_orchestrator::{
    AlertManager, AlertType, DataStoreDriver, Orchestrator, OrchestratorError, Planner,
    ResourceManager, StartParams, VolumeOrchestrator,
};
use ha_store::WorkItemStore;
use tracing::warn;

use crate::error::CoordinatorError;
use crate::fence::{fence_vm, Fencer};
use crate::gate::FeatureGate;
use crate::investigate::{investigate_host, investigate_vm, Investigator};
use crate::plan::start_with_fallback;

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// What a flow function decided to do with the item it was handed. The
/// shared post-execution logic in [`RecoveryEngine::apply_outcome`] turns
/// this into the actual store write.
enum Outcome {
    /// Nothing more to do; the item is finished successfully.
    Done,
    /// Superseded or otherwise no longer relevant.
    Cancelled,
    /// Retry later at this absolute epoch-seconds time.
    Reschedule(u64),
    /// A non-retryable failure; stop retrying and release the lease.
    Failed,
}

/// Everything the recovery state machine needs to execute one work item.
/// One instance is shared across the whole worker pool.
pub struct RecoveryEngine {
    pub store: Arc<dyn WorkItemStore>,
    pub orchestrator: Arc<dyn Orchestrator>,
    pub volume_orchestrator: Arc<dyn VolumeOrchestrator>,
    pub datastore_driver: Arc<dyn DataStoreDriver>,
    pub resource_manager: Arc<dyn ResourceManager>,
    pub alert_manager: Arc<dyn AlertManager>,
    pub investigators: Vec<Arc<dyn Investigator>>,
    pub fencers: Vec<Arc<dyn Fencer>>,
    pub ordinary_planner: Arc<dyn Planner>,
    pub ha_planners: Vec<Arc<dyn Planner>>,
    pub config: Arc<HaConfig>,
    pub gate: FeatureGate,
}

impl RecoveryEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn WorkItemStore>,
        orchestrator: Arc<dyn Orchestrator>,
        volume_orchestrator: Arc<dyn VolumeOrchestrator>,
        datastore_driver: Arc<dyn DataStoreDriver>,
        resource_manager: Arc<dyn ResourceManager>,
        alert_manager: Arc<dyn AlertManager>,
        investigators: Vec<Arc<dyn Investigator>>,
        fencers: Vec<Arc<dyn Fencer>>,
        ordinary_planner: Arc<dyn Planner>,
        ha_planners: Vec<Arc<dyn Planner>>,
        config: Arc<HaConfig>,
    ) -> Self {
        let gate = FeatureGate::new(config.clone());
        Self {
            store,
            orchestrator,
            volume_orchestrator,
            datastore_driver,
            resource_manager,
            alert_manager,
            investigators,
            fencers,
            ordinary_planner,
            ha_planners,
            config,
            gate,
        }
    }

    /// Entry point handed to the worker pool as `process_work`.
    pub async fn process(&self, mut item: WorkItem) -> Result<(), CoordinatorError> {
        let retry_interval = default_retry_interval(item.work_type, &self.config);
        let outcome = match item.work_type {
            WorkType::Ha => self.run_ha(&mut item).await,
            WorkType::Migration => self.run_migration(&mut item).await,
            WorkType::Stop | WorkType::CheckStop | WorkType::ForceStop => {
                self.run_stop_family(&mut item).await
            }
            WorkType::Destroy => self.run_destroy(&mut item).await,
        };

        match outcome {
            Ok(outcome) => self.apply_outcome(item, outcome).await,
            Err(CoordinatorError::Orchestrator(oe)) if !oe.is_retryable() => {
                warn!(work_id = %item.id, error = %oe, "non-retryable orchestrator error, giving up");
                self.apply_outcome(item, Outcome::Failed).await
            }
            Err(e) => {
                warn!(work_id = %item.id, error = %e, "step failed, rescheduling");
                self.refresh_from_live_vm(&mut item).await;
                self.apply_outcome(item, Outcome::Reschedule(now_secs() + retry_interval))
                    .await
            }
        }
    }

    async fn apply_outcome(&self, mut item: WorkItem, outcome: Outcome) -> Result<(), CoordinatorError> {
        match outcome {
            Outcome::Done => {
                item.step = Step::Done;
                item.completed_at = Some(now_secs());
                item.server_id = None;
                item.date_taken = None;
            }
            Outcome::Cancelled => {
                item.step = Step::Cancelled;
                item.completed_at = Some(now_secs());
                item.server_id = None;
                item.date_taken = None;
            }
            Outcome::Failed => {
                item.step = Step::Error;
                item.completed_at = Some(now_secs());
                item.server_id = None;
                item.date_taken = None;
            }
            Outcome::Reschedule(next_time_seconds) => {
                item.times_tried += 1;
                if item.times_tried >= self.config.migration_max_retries {
                    warn!(work_id = %item.id, times_tried = item.times_tried, "giving up after max retries");
                    item.step = Step::Done;
                    item.completed_at = Some(now_secs());
                } else {
                    item.time_to_try = next_time_seconds;
                }
                item.server_id = None;
                item.date_taken = None;
            }
        }
        self.store.update(&item).await?;
        Ok(())
    }

    async fn refresh_from_live_vm(&self, item: &mut WorkItem) {
        if let Ok(Some(vm)) = self.orchestrator.find_by_id(&item.instance_id).await {
            item.previous_state = vm.state;
            item.update_time = vm.update_time;
        }
    }

    async fn load_host(&self, item: &WorkItem) -> Option<Host> {
        match &item.host_id {
            Some(host_id) => self.orchestrator.find_host(host_id).await.ok().flatten(),
            None => None,
        }
    }

    // ── Ha (restart) flow ────────────────────────────────────────────────

    async fn run_ha(&self, item: &mut WorkItem) -> Result<Outcome, CoordinatorError> {
        let vm = match self.orchestrator.find_by_id(&item.instance_id).await? {
            Some(vm) => vm,
            None => return Ok(Outcome::Done),
        };

        // 1. Gate.
        if !self.gate.is_enabled(&vm.zone_id) {
            return Ok(Outcome::Reschedule(now_secs() + self.config.restart_retry_interval));
        }

        // 2. Supersede.
        if !self.store.list_future_ha_work_for_vm(&vm.id, item.id).await?.is_empty() {
            return Ok(Outcome::Cancelled);
        }

        // 3. Serialize.
        let running = self.store.list_running_ha_work_for_vm(&vm.id).await?;
        if running.iter().any(|other| other.id != item.id) {
            return Ok(Outcome::Reschedule(now_secs() + self.config.investigate_retry_interval));
        }

        // 4. Staleness check.
        if vm.state != item.previous_state || vm.update_time != item.update_time {
            return Ok(Outcome::Done);
        }

        let host = self.load_host(item).await;

        // 5. Policy exclusions.
        if let Some(host) = &host {
            if self.config.has_host_side_ha(&host.hypervisor) {
                return Ok(Outcome::Done);
            }
        }
        if self.orchestrator.is_root_volume_on_local_storage(&vm.id).await?
            && !self.volume_orchestrator.can_vm_restart_on_another_server(&vm.id).await?
        {
            return Ok(Outcome::Done);
        }

        // 6. Cancellable reasons.
        if item.step == Step::Investigating && item.reason_type.is_cancellable_on_host_up() {
            if let Some(host) = &host {
                if investigate_host(&self.investigators, host).await? == HostStatus::Up {
                    return Ok(Outcome::Cancelled);
                }
            }
        }

        // 7. Investigate.
        let alive = match &host {
            Some(host) => investigate_vm(&self.investigators, &vm, host).await?,
            None => VmLiveness::Unknown,
        };

        match alive {
            VmLiveness::Alive => {
                let host_up = match &host {
                    Some(host) => investigate_host(&self.investigators, host).await? == HostStatus::Up,
                    None => false,
                };
                if host_up {
                    return Ok(Outcome::Done);
                }
                return Ok(Outcome::Reschedule(now_secs() + self.config.investigate_retry_interval));
            }
            VmLiveness::Unknown => {
                let Some(host) = &host else {
                    // Host record already removed: proceed straight to stop+restart.
                    item.step = Step::Scheduled;
                    return self.stop_and_start(item, &vm).await;
                };
                if !fence_vm(&self.fencers, &vm, host).await? {
                    let _ = self
                        .alert_manager
                        .send_alert(
                            AlertType::FenceFailure,
                            &vm.zone_id,
                            None,
                            &format!("fencing failed for vm {}", vm.id),
                            "no fencer reported success",
                        )
                        .await;
                    return Ok(Outcome::Reschedule(now_secs() + self.config.restart_retry_interval));
                }
                item.step = Step::Scheduled;
            }
            VmLiveness::Dead => {
                item.step = Step::Scheduled;
            }
        }

        // 8-10. Stop+restart.
        self.stop_and_start(item, &vm).await
    }

    async fn stop_and_start(&self, item: &mut WorkItem, vm: &Vm) -> Result<Outcome, CoordinatorError> {
        self.orchestrator.advance_stop(&vm.id, true).await?;

        let ha_managed = self.config.force_ha || vm.ha_enabled;
        if !ha_managed {
            return Ok(Outcome::Done);
        }

        if !self.orchestrator.is_root_volume_on_local_storage(&vm.id).await? {
            self.datastore_driver.detach_volume_from_all_storage_nodes(&vm.id).await?;
        }

        let params = StartParams { ha_tag: self.config.ha_tag.clone() };
        let result = start_with_fallback(
            &self.orchestrator,
            &self.ordinary_planner,
            &self.ha_planners,
            &vm.id,
            &params,
        )
        .await;

        match result {
            Ok(started) if started.state == VmState::Running => Ok(Outcome::Done),
            Ok(started) => {
                item.previous_state = started.state;
                item.update_time = started.update_time;
                Ok(Outcome::Reschedule(now_secs() + self.config.restart_retry_interval))
            }
            Err(OrchestratorError::InsufficientCapacity(_)) => {
                let _ = self
                    .alert_manager
                    .send_alert(
                        AlertType::RestartFailure,
                        &vm.zone_id,
                        None,
                        &format!("no capacity to restart vm {}", vm.id),
                        "ordinary and HA planners both reported insufficient capacity",
                    )
                    .await;
                Ok(Outcome::Reschedule(now_secs() + self.config.restart_retry_interval))
            }
            Err(e) => Err(e.into()),
        }
    }

    // ── Migration flow ───────────────────────────────────────────────────

    async fn run_migration(&self, item: &mut WorkItem) -> Result<Outcome, CoordinatorError> {
        let vm = match self.orchestrator.find_by_id(&item.instance_id).await? {
            Some(vm) => vm,
            None => return Ok(Outcome::Done),
        };

        if vm.state == VmState::Stopped {
            return Ok(Outcome::Done);
        }
        let Some(source) = item.host_id.clone() else {
            return Ok(Outcome::Done);
        };
        if vm.host_id.as_ref() != Some(&source) && vm.state != VmState::Migrating {
            return Ok(Outcome::Done);
        }

        match self.orchestrator.migrate_away(&vm.id, &source).await {
            Ok(_) => Ok(Outcome::Done),
            Err(OrchestratorError::InsufficientCapacity(_)) => {
                self.resource_manager.migrate_away_failed(&source, &vm.id).await?;
                Ok(Outcome::Reschedule(now_secs() + self.config.migrate_retry_interval))
            }
            Err(e) => Err(e.into()),
        }
    }

    // ── Stop / CheckStop / ForceStop flow ───────────────────────────────

    async fn run_stop_family(&self, item: &mut WorkItem) -> Result<Outcome, CoordinatorError> {
        let vm = match self.orchestrator.find_by_id(&item.instance_id).await? {
            Some(vm) => vm,
            None => return Ok(Outcome::Done),
        };

        let guarded = matches!(item.work_type, WorkType::CheckStop | WorkType::ForceStop);
        if guarded {
            let unchanged = vm.state == item.previous_state
                && vm.update_time == item.update_time
                && vm.host_id == item.host_id;
            if !unchanged {
                return Ok(Outcome::Done);
            }
        }

        let force = matches!(item.work_type, WorkType::ForceStop);
        self.orchestrator.advance_stop(&vm.id, force).await?;
        Ok(Outcome::Done)
    }

    // ── Destroy flow ─────────────────────────────────────────────────────

    async fn run_destroy(&self, item: &mut WorkItem) -> Result<Outcome, CoordinatorError> {
        let vm = match self.orchestrator.find_by_id(&item.instance_id).await? {
            Some(vm) => vm,
            None => return Ok(Outcome::Done),
        };

        if item.previous_state == VmState::Destroyed && !vm.instance_type.is_system_vm() {
            return Ok(Outcome::Done);
        }

        if vm.state == VmState::Running {
            self.orchestrator.advance_stop(&vm.id, true).await?;
        }

        let expunge = vm.instance_type.is_system_vm();
        self.orchestrator.destroy(&vm.id, expunge).await?;
        Ok(Outcome::Done)
    }
}

fn default_retry_interval(work_type: WorkType, config: &HaConfig) -> u64 {
    match work_type {
        WorkType::Ha => config.restart_retry_interval,
        WorkType::Migration => config.migrate_retry_interval,
        WorkType::Stop | WorkType::CheckStop | WorkType::ForceStop => config.stop_retry_interval,
        WorkType::Destroy => config.stop_retry_interval,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fence::AlwaysSucceedsFencer;
    use crate::investigate::AbstainingInvestigator;
    use ha_domain::{HostId, InstanceType, VmId, ZoneId};
    use ha_orchestrator::{FixedPlanner, LocalOrchestrator};

    fn vm(id: &str, state: VmState) -> Vm {
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

    fn host() -> Host {
        Host {
            id: HostId::new("host-1"),
            zone_id: ZoneId::new("zone-1"),
            hypervisor: "kvm".into(),
            is_routing_only: false,
        }
    }

    fn engine(
        store: Arc<dyn WorkItemStore>,
        local: Arc<LocalOrchestrator>,
        config: HaConfig,
    ) -> RecoveryEngine {
        let orchestrator: Arc<dyn Orchestrator> = local.clone();
        RecoveryEngine::new(
            store,
            orchestrator,
            local.clone(),
            local.clone(),
            local.clone(),
            local,
            vec![Arc::new(AbstainingInvestigator)],
            vec![Arc::new(AlwaysSucceedsFencer)],
            Arc::new(FixedPlanner::new("ordinary", HostId::new("host-2"))),
            vec![Arc::new(FixedPlanner::new("ha", HostId::new("host-3")))],
            Arc::new(config),
        )
    }

    #[tokio::test]
    async fn staleness_marks_done_without_touching_the_vm() {
        let store = Arc::new(ha_store::InMemoryWorkItemStore::new());
        let local = Arc::new(LocalOrchestrator::new());
        local.seed(vm("vm-1", VmState::Running)).await;
        local.seed_host(host()).await;

        let item = WorkItem::new(
            VmId::new("vm-1"),
            InstanceType::User,
            WorkType::Ha,
            Some(HostId::new("host-1")),
            VmState::Stopped, // stale: live vm is Running
            1,
            ReasonType::HostDown,
            0,
        );
        let persisted = store.persist(item).await.unwrap();

        let eng = engine(store.clone(), local.clone(), HaConfig::default());
        eng.process(persisted.clone()).await.unwrap();

        let vm_after = local.find_by_id(&VmId::new("vm-1")).await.unwrap().unwrap();
        assert_eq!(vm_after.state, VmState::Running);
    }

    #[tokio::test]
    async fn dead_vm_is_stopped_and_restarted_to_done() {
        let store = Arc::new(ha_store::InMemoryWorkItemStore::new());
        let local = Arc::new(LocalOrchestrator::new());
        local.seed(vm("vm-1", VmState::Running)).await;
        local.seed_host(host()).await;

        let item = WorkItem::new(
            VmId::new("vm-1"),
            InstanceType::User,
            WorkType::Ha,
            Some(HostId::new("host-1")),
            VmState::Running,
            1,
            ReasonType::HostDown,
            0,
        );
        let persisted = store.persist(item).await.unwrap();

        let eng = engine(store.clone(), local.clone(), HaConfig::default());
        eng.process(persisted.clone()).await.unwrap();

        let vm_after = local.find_by_id(&VmId::new("vm-1")).await.unwrap().unwrap();
        assert_eq!(vm_after.state, VmState::Running);
        assert_eq!(vm_after.host_id, Some(HostId::new("host-2")));
    }

    #[tokio::test]
    async fn gate_off_reschedules_instead_of_executing() {
        let store = Arc::new(ha_store::InMemoryWorkItemStore::new());
        let local = Arc::new(LocalOrchestrator::new());
        local.seed(vm("vm-1", VmState::Running)).await;
        local.seed_host(host()).await;

        let item = WorkItem::new(
            VmId::new("vm-1"),
            InstanceType::User,
            WorkType::Ha,
            Some(HostId::new("host-1")),
            VmState::Running,
            1,
            ReasonType::HostDown,
            0,
        );
        let persisted = store.persist(item).await.unwrap();

        let mut config = HaConfig::default();
        config.vm_ha_enabled = ha_config::ZoneOverride::constant(false);
        let eng = engine(store.clone(), local.clone(), config);
        eng.process(persisted.clone()).await.unwrap();

        let stored = store.find_previous_ha(&VmId::new("vm-1")).await.unwrap().unwrap();
        assert_eq!(stored.step, Step::Scheduled);
        assert!(stored.time_to_try > 0);
    }

    #[tokio::test]
    async fn destroy_expunges_system_vms() {
        let store = Arc::new(ha_store::InMemoryWorkItemStore::new());
        let local = Arc::new(LocalOrchestrator::new());
        let mut router = vm("vm-1", VmState::Running);
        router.instance_type = InstanceType::DomainRouter;
        local.seed(router).await;

        let item = WorkItem::new(
            VmId::new("vm-1"),
            InstanceType::DomainRouter,
            WorkType::Destroy,
            Some(HostId::new("host-1")),
            VmState::Running,
            1,
            ReasonType::UserRequested,
            0,
        );
        let persisted = store.persist(item).await.unwrap();

        let eng = engine(store.clone(), local.clone(), HaConfig::default());
        eng.process(persisted.clone()).await.unwrap();

        let vm_after = local.find_by_id(&VmId::new("vm-1")).await.unwrap().unwrap();
        assert_eq!(vm_after.state, VmState::Expunging);
    }

    /// Delegates everything to a `LocalOrchestrator` except `destroy`, which
    /// always reports an internal (non-retryable) error.
    struct AlwaysFailsDestroy(Arc<LocalOrchestrator>);

    #[async_trait::async_trait]
    impl Orchestrator for AlwaysFailsDestroy {
        async fn find_by_id(&self, vm_id: &VmId) -> Result<Option<Vm>, OrchestratorError> {
            self.0.find_by_id(vm_id).await
        }
        async fn find_host(&self, host_id: &HostId) -> Result<Option<Host>, OrchestratorError> {
            self.0.find_host(host_id).await
        }
        async fn advance_stop(&self, vm_id: &VmId, force: bool) -> Result<Vm, OrchestratorError> {
            self.0.advance_stop(vm_id, force).await
        }
        async fn start_router_for_ha(
            &self,
            vm_id: &VmId,
            params: &StartParams,
            planner: &dyn Planner,
        ) -> Result<Vm, OrchestratorError> {
            self.0.start_router_for_ha(vm_id, params, planner).await
        }
        async fn start_proxy_for_ha(
            &self,
            vm_id: &VmId,
            params: &StartParams,
            planner: &dyn Planner,
        ) -> Result<Vm, OrchestratorError> {
            self.0.start_proxy_for_ha(vm_id, params, planner).await
        }
        async fn start_sec_storage_vm_for_ha(
            &self,
            vm_id: &VmId,
            params: &StartParams,
            planner: &dyn Planner,
        ) -> Result<Vm, OrchestratorError> {
            self.0.start_sec_storage_vm_for_ha(vm_id, params, planner).await
        }
        async fn start_virtual_machine_for_ha(
            &self,
            vm_id: &VmId,
            params: &StartParams,
            planner: &dyn Planner,
        ) -> Result<Vm, OrchestratorError> {
            self.0.start_virtual_machine_for_ha(vm_id, params, planner).await
        }
        async fn migrate_away(&self, vm_id: &VmId, source_host_id: &HostId) -> Result<Vm, OrchestratorError> {
            self.0.migrate_away(vm_id, source_host_id).await
        }
        async fn destroy(&self, _vm_id: &VmId, _expunge: bool) -> Result<(), OrchestratorError> {
            Err(OrchestratorError::Internal("simulated programming error".to_string()))
        }
        async fn is_root_volume_on_local_storage(&self, vm_id: &VmId) -> Result<bool, OrchestratorError> {
            self.0.is_root_volume_on_local_storage(vm_id).await
        }
    }

    #[tokio::test]
    async fn non_retryable_orchestrator_error_is_marked_error_instead_of_rescheduled() {
        let store = Arc::new(ha_store::InMemoryWorkItemStore::new());
        let local = Arc::new(LocalOrchestrator::new());
        local.seed(vm("vm-1", VmState::Running)).await;

        let item = WorkItem::new(
            VmId::new("vm-1"),
            InstanceType::User,
            WorkType::Destroy,
            Some(HostId::new("host-1")),
            VmState::Running,
            1,
            ReasonType::UserRequested,
            0,
        );
        let persisted = store.persist(item).await.unwrap();

        let failing: Arc<dyn Orchestrator> = Arc::new(AlwaysFailsDestroy(local.clone()));
        let eng = RecoveryEngine::new(
            store.clone(),
            failing,
            local.clone(),
            local.clone(),
            local.clone(),
            local,
            vec![Arc::new(AbstainingInvestigator)],
            vec![Arc::new(AlwaysSucceedsFencer)],
            Arc::new(FixedPlanner::new("ordinary", HostId::new("host-2"))),
            vec![Arc::new(FixedPlanner::new("ha", HostId::new("host-3")))],
            Arc::new(HaConfig::default()),
        );
        eng.process(persisted.clone()).await.unwrap();

        let all = store.list_all().await.unwrap();
        let item_after = all.into_iter().find(|i| i.id == persisted.id).unwrap();
        assert_eq!(item_after.step, Step::Error);
        assert!(item_after.server_id.is_none(), "lease must be released even on a hard failure");
    }

    #[tokio::test]
    async fn check_stop_is_a_noop_on_concurrent_change() {
        let store = Arc::new(ha_store::InMemoryWorkItemStore::new());
        let local = Arc::new(LocalOrchestrator::new());
        local.seed(vm("vm-1", VmState::Running)).await;

        let item = WorkItem::new(
            VmId::new("vm-1"),
            InstanceType::User,
            WorkType::CheckStop,
            Some(HostId::new("host-1")),
            VmState::Stopped, // does not match live state: guard fails
            99,
            ReasonType::UserRequested,
            0,
        );
        let persisted = store.persist(item).await.unwrap();

        let eng = engine(store.clone(), local.clone(), HaConfig::default());
        eng.process(persisted.clone()).await.unwrap();

        let vm_after = local.find_by_id(&VmId::new("vm-1")).await.unwrap().unwrap();
        assert_eq!(vm_after.state, VmState::Running); // unchanged: guard failed
    }
}
