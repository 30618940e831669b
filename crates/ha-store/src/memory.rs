use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ha_domain::{HostId, Step, VmId, WorkItem, WorkItemId, WorkType};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::store::{now_secs, WorkItemStore};

#[derive(Debug, Default)]
struct Inner {
    items: HashMap<WorkItemId, WorkItem>,
    next_id: u64,
}

/// In-memory implementation of [`WorkItemStore`].
///
/// All data is lost on process exit. Suitable for tests and single-process
/// trial runs where durability across restarts is not required.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWorkItemStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryWorkItemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkItemStore for InMemoryWorkItemStore {
    async fn persist(&self, mut item: WorkItem) -> Result<WorkItem, StoreError> {
        let mut guard = self.inner.write().await;
        guard.next_id += 1;
        item.id = WorkItemId(guard.next_id);
        item.step = Step::Scheduled;
        item.times_tried = 0;
        item.time_to_try = 0;
        guard.items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn take(&self, server_id: &str) -> Result<Option<WorkItem>, StoreError> {
        let now = now_secs();
        let mut guard = self.inner.write().await;
        let candidate_id = guard
            .items
            .values()
            .filter(|i| i.server_id.is_none() && i.time_to_try <= now)
            .min_by_key(|i| (i.time_to_try, i.id))
            .map(|i| i.id);

        let Some(id) = candidate_id else {
            return Ok(None);
        };
        let item = guard.items.get_mut(&id).expect("candidate id must exist");
        item.server_id = Some(server_id.to_string());
        item.date_taken = Some(now);
        Ok(Some(item.clone()))
    }

    async fn update(&self, item: &WorkItem) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if !guard.items.contains_key(&item.id) {
            return Err(StoreError::NotFound(item.id.as_u64()));
        }
        guard.items.insert(item.id, item.clone());
        Ok(())
    }

    async fn has_been_scheduled(&self, vm_id: &VmId, work_type: WorkType) -> Result<bool, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard
            .items
            .values()
            .any(|i| i.instance_id == *vm_id && i.work_type == work_type && !i.step.is_terminal()))
    }

    async fn list_pending_ha_work_for_vm(&self, vm_id: &VmId) -> Result<Vec<WorkItem>, StoreError> {
        let guard = self.inner.read().await;
        Ok(filter_vm_work(guard.items.values(), vm_id, WorkType::Ha, |i| {
            !i.step.is_terminal()
        }))
    }

    async fn list_pending_migrations_for_vm(
        &self,
        vm_id: &VmId,
    ) -> Result<Vec<WorkItem>, StoreError> {
        let guard = self.inner.read().await;
        Ok(filter_vm_work(guard.items.values(), vm_id, WorkType::Migration, |i| {
            !i.step.is_terminal()
        }))
    }

    async fn find_previous_ha(&self, vm_id: &VmId) -> Result<Option<WorkItem>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard
            .items
            .values()
            .filter(|i| i.instance_id == *vm_id && i.work_type == WorkType::Ha)
            .max_by_key(|i| i.id)
            .cloned())
    }

    async fn list_future_ha_work_for_vm(
        &self,
        vm_id: &VmId,
        exclude_id: WorkItemId,
    ) -> Result<Vec<WorkItem>, StoreError> {
        let guard = self.inner.read().await;
        Ok(filter_vm_work(guard.items.values(), vm_id, WorkType::Ha, |i| {
            !i.step.is_terminal() && i.id > exclude_id
        }))
    }

    async fn list_running_ha_work_for_vm(&self, vm_id: &VmId) -> Result<Vec<WorkItem>, StoreError> {
        let guard = self.inner.read().await;
        Ok(filter_vm_work(guard.items.values(), vm_id, WorkType::Ha, |i| {
            !i.step.is_terminal() && i.is_taken()
        }))
    }

    async fn find_taken_work_items(&self, work_type: WorkType) -> Result<Vec<WorkItem>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard
            .items
            .values()
            .filter(|i| i.work_type == work_type && i.is_taken())
            .cloned()
            .collect())
    }

    async fn delete_migration_work_items(
        &self,
        host_id: &HostId,
        work_type: WorkType,
        server_id: &str,
    ) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.items.retain(|_, i| {
            !(i.work_type == work_type
                && i.host_id.as_ref() == Some(host_id)
                && i.server_id.as_deref() == Some(server_id))
        });
        Ok(())
    }

    async fn release_work_items(&self, server_id: &str) -> Result<usize, StoreError> {
        let mut guard = self.inner.write().await;
        let mut count = 0;
        for item in guard.items.values_mut() {
            if item.server_id.as_deref() == Some(server_id) {
                item.server_id = None;
                item.date_taken = None;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn mark_pending_works_as_investigating(&self) -> Result<usize, StoreError> {
        let mut guard = self.inner.write().await;
        let mut count = 0;
        for item in guard.items.values_mut() {
            if item.step == Step::Investigating && item.is_taken() {
                item.server_id = None;
                item.date_taken = None;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn mark_server_pending_works_as_investigating(
        &self,
        server_id: &str,
    ) -> Result<usize, StoreError> {
        let mut guard = self.inner.write().await;
        let mut count = 0;
        for item in guard.items.values_mut() {
            if item.step == Step::Investigating && item.server_id.as_deref() == Some(server_id) {
                item.server_id = None;
                item.date_taken = None;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn cleanup(&self, older_than: u64) -> Result<usize, StoreError> {
        let mut guard = self.inner.write().await;
        let before = guard.items.len();
        guard
            .items
            .retain(|_, i| !(i.step.is_terminal() && i.completed_at.is_some_and(|t| t <= older_than)));
        Ok(before - guard.items.len())
    }

    async fn expunge_by_vm_list(&self, vm_ids: &[VmId], batch_size: usize) -> Result<usize, StoreError> {
        let mut guard = self.inner.write().await;
        let to_remove: Vec<WorkItemId> = guard
            .items
            .values()
            .filter(|i| vm_ids.contains(&i.instance_id))
            .take(batch_size)
            .map(|i| i.id)
            .collect();
        for id in &to_remove {
            guard.items.remove(id);
        }
        Ok(to_remove.len())
    }

    async fn delete(&self, vm_id: &VmId, work_type: WorkType) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard
            .items
            .retain(|_, i| !(i.instance_id == *vm_id && i.work_type == work_type));
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<WorkItem>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.items.values().cloned().collect())
    }
}

fn filter_vm_work<'a>(
    items: impl Iterator<Item = &'a WorkItem>,
    vm_id: &VmId,
    work_type: WorkType,
    pred: impl Fn(&WorkItem) -> bool,
) -> Vec<WorkItem> {
    items
        .filter(|i| i.instance_id == *vm_id && i.work_type == work_type && pred(i))
        .cloned()
        .collect()
}
