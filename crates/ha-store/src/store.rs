use async_trait::async_trait;
use ha_domain::{HostId, VmId, WorkItem, WorkItemId, WorkType};

use crate::error::StoreError;

/// Durable persistence of [`WorkItem`] records with claim/lease, ordering, and
/// cleanup. At most one worker across the cluster may hold a lease on a given
/// item at a time; this trait is the sole shared mutable resource the
/// coordinator depends on.
#[async_trait]
pub trait WorkItemStore: Send + Sync + 'static {
    /// Assign `id`, reset `step`/`times_tried`/`time_to_try` to their
    /// just-scheduled values, and persist. Returns the item with `id` filled in.
    async fn persist(&self, item: WorkItem) -> Result<WorkItem, StoreError>;

    /// Atomically select an untaken, eligible item — `server_id is null AND
    /// time_to_try <= now` — ordered by `(time_to_try, id)` ascending, mark it
    /// taken by `server_id`, and return it. Two concurrent callers never
    /// receive the same item.
    async fn take(&self, server_id: &str) -> Result<Option<WorkItem>, StoreError>;

    /// Write back a previously read item. Must not change `id`.
    async fn update(&self, item: &WorkItem) -> Result<(), StoreError>;

    /// True when a non-terminal item exists for `(vm_id, work_type)`.
    async fn has_been_scheduled(&self, vm_id: &VmId, work_type: WorkType) -> Result<bool, StoreError>;

    async fn list_pending_ha_work_for_vm(&self, vm_id: &VmId) -> Result<Vec<WorkItem>, StoreError>;

    async fn list_pending_migrations_for_vm(
        &self,
        vm_id: &VmId,
    ) -> Result<Vec<WorkItem>, StoreError>;

    /// The most recently created HA item for this VM, regardless of step,
    /// used to carry retry counts forward across flapping VMs. Callers that
    /// want the *prior* incident must call this before persisting a new item.
    async fn find_previous_ha(&self, vm_id: &VmId) -> Result<Option<WorkItem>, StoreError>;

    /// Non-terminal HA items for this VM created after `exclude_id`, used to
    /// detect that this item has been superseded.
    async fn list_future_ha_work_for_vm(
        &self,
        vm_id: &VmId,
        exclude_id: WorkItemId,
    ) -> Result<Vec<WorkItem>, StoreError>;

    /// Currently-taken (leased) HA items for this VM, used to serialize
    /// concurrent HA attempts against the same VM.
    async fn list_running_ha_work_for_vm(&self, vm_id: &VmId) -> Result<Vec<WorkItem>, StoreError>;

    /// All items of `work_type` currently leased anywhere, for introspection.
    async fn find_taken_work_items(&self, work_type: WorkType) -> Result<Vec<WorkItem>, StoreError>;

    /// Used when a host is taken out of service: drop queued migration work
    /// for it that this peer still owns.
    async fn delete_migration_work_items(
        &self,
        host_id: &HostId,
        work_type: WorkType,
        server_id: &str,
    ) -> Result<(), StoreError>;

    /// Clear lease fields (`server_id`, `date_taken`) for every item owned by
    /// `server_id`. Idempotent.
    async fn release_work_items(&self, server_id: &str) -> Result<usize, StoreError>;

    /// On startup: ownerless items left in `Investigating` are made eligible
    /// again without losing their step.
    async fn mark_pending_works_as_investigating(&self) -> Result<usize, StoreError>;

    /// On graceful shutdown: the symmetric operation, scoped to one server.
    async fn mark_server_pending_works_as_investigating(
        &self,
        server_id: &str,
    ) -> Result<usize, StoreError>;

    /// Purge terminal items with `completed_at <= older_than`. Never touches
    /// non-terminal items. Returns the number purged.
    async fn cleanup(&self, older_than: u64) -> Result<usize, StoreError>;

    /// Bulk purge tied to external VM removal.
    async fn expunge_by_vm_list(&self, vm_ids: &[VmId], batch_size: usize) -> Result<usize, StoreError>;

    /// Cancel-by-type helper used for `Destroy` cancellation.
    async fn delete(&self, vm_id: &VmId, work_type: WorkType) -> Result<(), StoreError>;

    /// Every item currently in the store, for introspection (e.g. the CLI's
    /// `status` summary). Not used by the worker or scheduling paths.
    async fn list_all(&self) -> Result<Vec<WorkItem>, StoreError>;
}

pub(crate) fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
