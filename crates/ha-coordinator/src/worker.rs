use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ha_domain::WorkItem;
use ha_store::WorkItemStore;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info_span, Instrument};

/// A fixed pool of long-lived workers, each polling the store for claimable
/// work. `wakeup()` is called by every `schedule_*` Scheduler API operation
/// so new work is picked up without waiting out the idle timeout.
pub struct WorkerPool<F> {
    server_id: String,
    worker_count: u32,
    time_to_sleep: Duration,
    store: Arc<dyn WorkItemStore>,
    notify: Arc<Notify>,
    stopped: Arc<AtomicBool>,
    process_work: Arc<F>,
}

impl<F, Fut> WorkerPool<F>
where
    F: Fn(WorkItem) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<(), crate::CoordinatorError>> + Send,
{
    pub fn new(
        server_id: impl Into<String>,
        worker_count: u32,
        time_to_sleep: Duration,
        store: Arc<dyn WorkItemStore>,
        process_work: F,
    ) -> Self {
        Self {
            server_id: server_id.into(),
            worker_count,
            time_to_sleep,
            store,
            notify: Arc::new(Notify::new()),
            stopped: Arc::new(AtomicBool::new(false)),
            process_work: Arc::new(process_work),
        }
    }

    /// Notify every idle worker immediately instead of waiting for the next
    /// `time_to_sleep` tick.
    pub fn wakeup(&self) {
        self.notify.notify_waiters();
    }

    /// Spawn `worker_count` long-lived tasks. Each runs until `stop()` is called.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        (0..self.worker_count)
            .map(|idx| {
                let server_id = self.server_id.clone();
                let store = self.store.clone();
                let notify = self.notify.clone();
                let stopped = self.stopped.clone();
                let process_work = self.process_work.clone();
                let time_to_sleep = self.time_to_sleep;
                tokio::spawn(async move {
                    worker_loop(idx, server_id, store, notify, stopped, process_work, time_to_sleep).await;
                })
            })
            .collect()
    }

    /// Signal every worker to exit after its current iteration, then release
    /// this peer's in-flight leases so they become re-claimable elsewhere.
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
        if let Err(e) = self.store.mark_server_pending_works_as_investigating(&self.server_id).await {
            error!(error = %e, "failed to release investigating work on shutdown");
        }
    }
}

async fn worker_loop<F, Fut>(
    idx: u32,
    server_id: String,
    store: Arc<dyn WorkItemStore>,
    notify: Arc<Notify>,
    stopped: Arc<AtomicBool>,
    process_work: Arc<F>,
    time_to_sleep: Duration,
) where
    F: Fn(WorkItem) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<(), crate::CoordinatorError>> + Send,
{
    while !stopped.load(Ordering::SeqCst) {
        let item = match store.take(&server_id).await {
            Ok(Some(item)) => item,
            Ok(None) => {
                tokio::select! {
                    _ = notify.notified() => {}
                    _ = tokio::time::sleep(time_to_sleep) => {}
                }
                continue;
            }
            Err(e) => {
                error!(worker = idx, error = %e, "failed to take work item");
                tokio::time::sleep(time_to_sleep).await;
                continue;
            }
        };

        let span = info_span!("work", id = %item.id);
        let id = item.id;
        async {
            if let Err(e) = process_work(item).await {
                error!(work_id = %id, error = %e, "work item processing failed, continuing");
            }
        }
        .instrument(span)
        .await;
    }
}
