use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use ha_config::{load_ha_config, HaConfig};
use ha_coordinator::{
    AbstainingInvestigator, AlwaysSucceedsFencer, CleanupTask, PeerCoordinator, PeerEvent,
    RecoveryEngine, SchedulerApi, WorkerPool,
};
use ha_domain::{Host, HostId, InstanceType, ReasonType, Vm, VmId, VmState, WorkType, ZoneId};
use ha_orchestrator::{FixedPlanner, LocalOrchestrator, Orchestrator, Planner};
use ha_store::{InMemoryWorkItemStore, RedbWorkItemStore, WorkItemStore};
use tokio::sync::Notify;
use tracing::info;

use crate::cli::{ScheduleCommand, StopWorkTypeArg, StoreBackend};
use crate::output::render_status;

/// Everything a subcommand needs. The orchestrator is a `LocalOrchestrator`:
/// this CLI drives the coordinator's logic against a deterministic,
/// side-effect-free stand-in rather than a real hypervisor fleet, consistent
/// with it being a single-node trial/operator tool.
pub struct Runtime {
    pub store: Arc<dyn WorkItemStore>,
    pub config: Arc<HaConfig>,
    pub orchestrator: Arc<LocalOrchestrator>,
    pub scheduler: SchedulerApi,
    pub server_id: String,
}

pub fn build_runtime(
    config_path: &Path,
    store: StoreBackend,
    store_path: &Path,
    server_id: &str,
) -> Result<Runtime> {
    let config = Arc::new(if config_path.exists() {
        load_ha_config(config_path)?
    } else {
        HaConfig::default()
    });

    let work_store: Arc<dyn WorkItemStore> = match store {
        StoreBackend::Memory => Arc::new(InMemoryWorkItemStore::new()),
        StoreBackend::Redb => Arc::new(RedbWorkItemStore::open(store_path)?),
    };

    let orchestrator = Arc::new(LocalOrchestrator::new());
    let scheduler = SchedulerApi::new(
        server_id.to_string(),
        work_store.clone(),
        config.clone(),
        orchestrator.clone() as Arc<dyn Orchestrator>,
        vec![Arc::new(AbstainingInvestigator)],
        orchestrator.clone(),
        Arc::new(Notify::new()),
    );

    Ok(Runtime { store: work_store, config, orchestrator, scheduler, server_id: server_id.to_string() })
}

/// Materialize a VM record if the local orchestrator's inventory doesn't
/// already have one; this is a trial tool with no external inventory feed.
async fn ensure_vm(orchestrator: &LocalOrchestrator, vm_id: &VmId, host_id: &HostId) -> Vm {
    if let Some(vm) = orchestrator.find_by_id(vm_id).await.ok().flatten() {
        return vm;
    }
    let vm = Vm {
        id: vm_id.clone(),
        instance_type: InstanceType::User,
        state: VmState::Running,
        host_id: Some(host_id.clone()),
        last_host_id: None,
        zone_id: ZoneId::new("default"),
        update_time: 0,
        ha_enabled: true,
    };
    orchestrator.seed(vm.clone()).await;
    vm
}

async fn ensure_host(orchestrator: &LocalOrchestrator, host_id: &HostId) -> Host {
    if let Some(host) = orchestrator.find_host(host_id).await.ok().flatten() {
        return host;
    }
    let host = Host {
        id: host_id.clone(),
        zone_id: ZoneId::new("default"),
        hypervisor: "kvm".to_string(),
        is_routing_only: false,
    };
    orchestrator.seed_host(host.clone()).await;
    host
}

// ── run ───────────────────────────────────────────────────────────────────

pub async fn run(rt: Runtime) -> Result<()> {
    let orchestrator: Arc<dyn Orchestrator> = rt.orchestrator.clone();
    let ordinary_planner: Arc<dyn Planner> =
        Arc::new(FixedPlanner::new("cli-ordinary", HostId::new("auto")));
    let ha_planners: Vec<Arc<dyn Planner>> =
        vec![Arc::new(FixedPlanner::new("cli-ha-fallback", HostId::new("auto-ha")))];

    let engine = Arc::new(RecoveryEngine::new(
        rt.store.clone(),
        orchestrator,
        rt.orchestrator.clone(),
        rt.orchestrator.clone(),
        rt.orchestrator.clone(),
        rt.orchestrator.clone(),
        vec![Arc::new(AbstainingInvestigator)],
        vec![Arc::new(AlwaysSucceedsFencer)],
        ordinary_planner,
        ha_planners,
        rt.config.clone(),
    ));

    let pool = WorkerPool::new(
        "hacoord-local",
        rt.config.ha_workers,
        Duration::from_secs(rt.config.time_to_sleep),
        rt.store.clone(),
        move |item| {
            let engine = engine.clone();
            async move { engine.process(item).await }
        },
    );

    let cleanup = Arc::new(CleanupTask::new(rt.store.clone(), rt.config.clone()));
    // This local trial tool has no cluster membership feed to drive
    // PeerCoordinator from, so the only event it ever sees is this server's
    // own graceful departure, raised below on shutdown.
    let peers = PeerCoordinator::new(rt.store.clone());

    info!(workers = rt.config.ha_workers, "starting worker pool");
    let handles = pool.start();
    let _cleanup_handle = cleanup.spawn();

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested, draining workers");
    pool.stop().await;
    if let Err(e) = peers.handle(PeerEvent::Left(rt.server_id.clone())).await {
        tracing::error!(error = %e, "failed to release leases on departure");
    }
    for h in handles {
        let _ = h.await;
    }
    Ok(())
}

// ── schedule ──────────────────────────────────────────────────────────────

pub async fn schedule(rt: &Runtime, command: ScheduleCommand) -> Result<()> {
    match command {
        ScheduleCommand::Restart { vm, host, investigate } => {
            let vm_id = VmId::new(vm);
            let host_id = HostId::new(host);
            let vm = ensure_vm(&rt.orchestrator, &vm_id, &host_id).await;
            rt.scheduler.schedule_restart(&vm, investigate, ReasonType::HostDown).await?;
            println!("scheduled restart for {vm_id}");
        }
        ScheduleCommand::Stop { vm, host, work_type } => {
            let vm_id = VmId::new(vm);
            let host_id = host.map(HostId::new).unwrap_or_else(|| HostId::new("auto"));
            let vm = ensure_vm(&rt.orchestrator, &vm_id, &host_id).await;
            let work_type = match work_type {
                StopWorkTypeArg::Stop => WorkType::Stop,
                StopWorkTypeArg::CheckStop => WorkType::CheckStop,
                StopWorkTypeArg::ForceStop => WorkType::ForceStop,
            };
            rt.scheduler
                .schedule_stop(&vm, Some(&host_id), work_type, ReasonType::UserRequested)
                .await?;
            println!("scheduled {work_type} for {vm_id}");
        }
        ScheduleCommand::Migration { vm, host } => {
            let vm_id = VmId::new(vm);
            let host_id = HostId::new(host);
            let vm = ensure_vm(&rt.orchestrator, &vm_id, &host_id).await;
            rt.scheduler.schedule_migration(&vm, ReasonType::HostMaintenance).await?;
            println!("scheduled migration for {vm_id}");
        }
        ScheduleCommand::Destroy { vm, host } => {
            let vm_id = VmId::new(vm.clone());
            let host_id = host.clone().map(HostId::new).unwrap_or_else(|| HostId::new("auto"));
            let vm = ensure_vm(&rt.orchestrator, &vm_id, &host_id).await;
            rt.scheduler
                .schedule_destroy(&vm, host.map(HostId::new).as_ref(), ReasonType::UserRequested)
                .await?;
            println!("scheduled destroy for {vm_id}");
        }
    }
    Ok(())
}

// ── investigate ───────────────────────────────────────────────────────────

pub async fn investigate(rt: &Runtime, host: String) -> Result<()> {
    let host_id = HostId::new(host);
    let host = ensure_host(&rt.orchestrator, &host_id).await;
    let status = rt.scheduler.investigate(&host).await?;
    println!("{status:?}");
    Ok(())
}

// ── status ────────────────────────────────────────────────────────────────

pub async fn status(rt: &Runtime) -> Result<()> {
    let report = rt.scheduler.status().await?;
    print!("{}", render_status(&report));
    Ok(())
}

// ── cleanup ───────────────────────────────────────────────────────────────

pub async fn cleanup(rt: &Runtime) -> Result<()> {
    let task = CleanupTask::new(rt.store.clone(), rt.config.clone());
    let purged = task.run_once().await?;
    println!("purged {purged} item(s)");
    Ok(())
}
