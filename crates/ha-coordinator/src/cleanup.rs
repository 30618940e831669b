use std::sync::Arc;
use std::time::Duration;

use ha_config::HaConfig;
use ha_store::WorkItemStore;
use tracing::info;

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Periodically purges terminal work items older than `time_between_failures`.
/// Never touches non-terminal items — the store's `cleanup` contract already
/// enforces that, this task just supplies the cadence and the cutoff.
pub struct CleanupTask {
    store: Arc<dyn WorkItemStore>,
    config: Arc<HaConfig>,
}

impl CleanupTask {
    pub fn new(store: Arc<dyn WorkItemStore>, config: Arc<HaConfig>) -> Self {
        Self { store, config }
    }

    /// Run one cleanup pass immediately, returning the number of items purged.
    pub async fn run_once(&self) -> Result<usize, ha_store::StoreError> {
        let older_than = now_secs().saturating_sub(self.config.time_between_failures);
        let purged = self.store.cleanup(older_than).await?;
        info!(purged, older_than, "cleanup pass complete");
        Ok(purged)
    }

    /// Spawn the periodic task; runs until the returned handle is aborted.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let period = Duration::from_secs(self.config.time_between_cleanup.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    tracing::error!(error = %e, "cleanup pass failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_domain::{HostId, InstanceType, ReasonType, Step, VmId, VmState, WorkItem, WorkType};
    use ha_store::InMemoryWorkItemStore;

    #[tokio::test]
    async fn run_once_purges_only_old_terminal_items() {
        let store = Arc::new(InMemoryWorkItemStore::new());
        let mut config = HaConfig::default();
        config.time_between_failures = 100;
        let task = CleanupTask::new(store.clone(), Arc::new(config));

        let mut old_done = store
            .persist(WorkItem::new(
                VmId::new("vm-1"),
                InstanceType::User,
                WorkType::Ha,
                Some(HostId::new("host-1")),
                VmState::Running,
                1,
                ReasonType::HostDown,
                0,
            ))
            .await
            .unwrap();
        old_done.step = Step::Done;
        old_done.completed_at = Some(0);
        store.update(&old_done).await.unwrap();

        store
            .persist(WorkItem::new(
                VmId::new("vm-2"),
                InstanceType::User,
                WorkType::Ha,
                Some(HostId::new("host-1")),
                VmState::Running,
                1,
                ReasonType::HostDown,
                0,
            ))
            .await
            .unwrap();

        let purged = task.run_once().await.unwrap();
        assert_eq!(purged, 1);
    }
}
