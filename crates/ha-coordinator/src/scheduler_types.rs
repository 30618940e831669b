use ha_domain::{Step, WorkType};
use thiserror::Error;

/// Failures the Scheduler API can report back to its caller. Orchestrator
/// and investigator failures never surface here — those are internal to the
/// worker's execution of the work item, not to scheduling it.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("work already scheduled for this vm/work_type")]
    AlreadyScheduled,

    #[error("{work_type} is not a valid stop-family work type")]
    InvalidStopWorkType { work_type: WorkType },

    #[error(transparent)]
    Store(#[from] ha_store::StoreError),
}

/// One `(work_type, step)` bucket in a `status` summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCount {
    pub work_type: WorkType,
    pub step: Step,
    pub count: usize,
}

/// Snapshot used by the CLI `status` command and by tests asserting on
/// queue shape without reaching into the store directly.
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    pub counts: Vec<StatusCount>,
}

impl StatusReport {
    pub fn total(&self) -> usize {
        self.counts.iter().map(|c| c.count).sum()
    }
}
