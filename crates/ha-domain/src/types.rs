use serde::{Deserialize, Serialize};

// ── Identifiers ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkItemId(pub u64);

impl WorkItemId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VmId(pub String);

impl VmId {
    pub fn new(s: impl Into<String>) -> Self {
        VmId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VmId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostId(pub String);

impl HostId {
    pub fn new(s: impl Into<String>) -> Self {
        HostId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZoneId(pub String);

impl ZoneId {
    pub fn new(s: impl Into<String>) -> Self {
        ZoneId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Enums ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceType {
    User,
    DomainRouter,
    ConsoleProxy,
    SecondaryStorageVm,
    Other,
}

impl std::fmt::Display for InstanceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceType::User => write!(f, "user"),
            InstanceType::DomainRouter => write!(f, "domain_router"),
            InstanceType::ConsoleProxy => write!(f, "console_proxy"),
            InstanceType::SecondaryStorageVm => write!(f, "secondary_storage_vm"),
            InstanceType::Other => write!(f, "other"),
        }
    }
}

impl InstanceType {
    /// System VMs have a dedicated starter and are expunged rather than stopped on destroy.
    pub fn is_system_vm(&self) -> bool {
        matches!(
            self,
            InstanceType::DomainRouter
                | InstanceType::ConsoleProxy
                | InstanceType::SecondaryStorageVm
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkType {
    Ha,
    Migration,
    Stop,
    CheckStop,
    ForceStop,
    Destroy,
}

impl std::fmt::Display for WorkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkType::Ha => write!(f, "ha"),
            WorkType::Migration => write!(f, "migration"),
            WorkType::Stop => write!(f, "stop"),
            WorkType::CheckStop => write!(f, "check_stop"),
            WorkType::ForceStop => write!(f, "force_stop"),
            WorkType::Destroy => write!(f, "destroy"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Scheduled,
    Investigating,
    Fencing,
    Migrating,
    Done,
    Cancelled,
    Error,
}

impl Step {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Step::Done | Step::Cancelled | Step::Error)
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Scheduled => write!(f, "scheduled"),
            Step::Investigating => write!(f, "investigating"),
            Step::Fencing => write!(f, "fencing"),
            Step::Migrating => write!(f, "migrating"),
            Step::Done => write!(f, "done"),
            Step::Cancelled => write!(f, "cancelled"),
            Step::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonType {
    HostMaintenance,
    HostDown,
    HostDegraded,
    VmStopped,
    UserRequested,
    Unknown,
}

impl std::fmt::Display for ReasonType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReasonType::HostMaintenance => write!(f, "host_maintenance"),
            ReasonType::HostDown => write!(f, "host_down"),
            ReasonType::HostDegraded => write!(f, "host_degraded"),
            ReasonType::VmStopped => write!(f, "vm_stopped"),
            ReasonType::UserRequested => write!(f, "user_requested"),
            ReasonType::Unknown => write!(f, "unknown"),
        }
    }
}

/// Cancellable HA reasons: reasons for which re-investigation observing the
/// host as `Up` should cancel the pending work rather than continue it.
impl ReasonType {
    pub fn is_cancellable_on_host_up(&self) -> bool {
        matches!(
            self,
            ReasonType::HostMaintenance | ReasonType::HostDown | ReasonType::HostDegraded
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmState {
    Running,
    Stopped,
    Migrating,
    Destroyed,
    Expunging,
    Starting,
    Stopping,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    Up,
    Down,
    Disconnected,
    Alert,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmLiveness {
    Alive,
    Dead,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FenceResult {
    Success,
    Failure,
    NotApplicable,
}

// ── Core structs ──────────────────────────────────────────────────────────────

/// A point-in-time snapshot of a VM's orchestration-relevant state, as
/// returned by `Orchestrator::find_by_id`. Distinct from `WorkItem`, which
/// records what the VM looked like *when the work was scheduled*.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vm {
    pub id: VmId,
    pub instance_type: InstanceType,
    pub state: VmState,
    pub host_id: Option<HostId>,
    /// Host the VM is migrating away from, used when `state == Migrating`.
    pub last_host_id: Option<HostId>,
    pub zone_id: ZoneId,
    /// Monotonic counter bumped on every orchestrator-visible state change;
    /// used by the state machine to detect concurrent user action.
    pub update_time: u64,
    /// Whether this VM has opted in to HA independent of the `force_ha` config flag.
    pub ha_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,
    pub zone_id: ZoneId,
    pub hypervisor: String,
    /// True for hosts that only route placement, never run HA-managed workloads
    /// themselves (e.g. storage-only or routing hosts).
    pub is_routing_only: bool,
}

/// The only persistent entity the coordinator core owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub instance_id: VmId,
    pub instance_type: InstanceType,
    pub work_type: WorkType,
    pub step: Step,
    pub host_id: Option<HostId>,
    pub previous_state: VmState,
    pub update_time: u64,
    pub times_tried: u32,
    /// Earliest epoch-seconds at which the item is eligible; 0 means "now".
    pub time_to_try: u64,
    /// When a worker last claimed this item; `None` when released.
    pub date_taken: Option<u64>,
    /// Which management peer currently owns the lease; `None` when released.
    pub server_id: Option<String>,
    pub reason_type: ReasonType,
    pub created_at: u64,
    pub completed_at: Option<u64>,
}

impl WorkItem {
    /// Construct a new item as the Scheduler API would before persisting it.
    /// `persist` is responsible for assigning `id` and resetting the
    /// scheduling fields (`step`, `times_tried`, `time_to_try`).
    pub fn new(
        instance_id: VmId,
        instance_type: InstanceType,
        work_type: WorkType,
        host_id: Option<HostId>,
        previous_state: VmState,
        update_time: u64,
        reason_type: ReasonType,
        created_at: u64,
    ) -> Self {
        WorkItem {
            id: WorkItemId(0),
            instance_id,
            instance_type,
            work_type,
            step: Step::Scheduled,
            host_id,
            previous_state,
            update_time,
            times_tried: 0,
            time_to_try: 0,
            date_taken: None,
            server_id: None,
            reason_type,
            created_at,
            completed_at: None,
        }
    }

    pub fn is_taken(&self) -> bool {
        self.server_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_vm_types_are_flagged() {
        assert!(InstanceType::DomainRouter.is_system_vm());
        assert!(InstanceType::ConsoleProxy.is_system_vm());
        assert!(InstanceType::SecondaryStorageVm.is_system_vm());
        assert!(!InstanceType::User.is_system_vm());
        assert!(!InstanceType::Other.is_system_vm());
    }

    #[test]
    fn terminal_steps() {
        assert!(Step::Done.is_terminal());
        assert!(Step::Cancelled.is_terminal());
        assert!(Step::Error.is_terminal());
        assert!(!Step::Scheduled.is_terminal());
        assert!(!Step::Investigating.is_terminal());
        assert!(!Step::Fencing.is_terminal());
        assert!(!Step::Migrating.is_terminal());
    }

    #[test]
    fn cancellable_reasons() {
        assert!(ReasonType::HostMaintenance.is_cancellable_on_host_up());
        assert!(ReasonType::HostDown.is_cancellable_on_host_up());
        assert!(ReasonType::HostDegraded.is_cancellable_on_host_up());
        assert!(!ReasonType::VmStopped.is_cancellable_on_host_up());
        assert!(!ReasonType::UserRequested.is_cancellable_on_host_up());
        assert!(!ReasonType::Unknown.is_cancellable_on_host_up());
    }

    #[test]
    fn new_work_item_starts_scheduled_and_untaken() {
        let item = WorkItem::new(
            VmId::new("vm-1"),
            InstanceType::User,
            WorkType::Ha,
            Some(HostId::new("host-1")),
            VmState::Running,
            7,
            ReasonType::HostDown,
            1000,
        );
        assert_eq!(item.step, Step::Scheduled);
        assert_eq!(item.times_tried, 0);
        assert!(!item.is_taken());
    }
}
