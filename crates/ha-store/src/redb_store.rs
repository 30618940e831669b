use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use ha_domain::{HostId, Step, VmId, WorkItem, WorkItemId, WorkType};
use redb::{Database, ReadableTable, TableDefinition};

use crate::error::StoreError;
use crate::store::{now_secs, WorkItemStore};

const ITEMS: TableDefinition<u64, &[u8]> = TableDefinition::new("work_items");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

fn internal(e: impl std::fmt::Display) -> StoreError {
    StoreError::Internal(e.to_string())
}

/// Persistent [`WorkItemStore`] backed by a `redb` database file.
///
/// All work items survive process restarts. Suitable for a single-node
/// production deployment where the store does not need to be shared over
/// the network.
#[derive(Clone)]
pub struct RedbWorkItemStore {
    db: Arc<Database>,
}

impl RedbWorkItemStore {
    /// Open (or create) a redb database at `path`. Parent directories are
    /// created automatically.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(internal)?;
        }
        let db = Database::create(path).map_err(internal)?;
        {
            let wtxn = db.begin_write().map_err(internal)?;
            wtxn.open_table(ITEMS).map_err(internal)?;
            wtxn.open_table(META).map_err(internal)?;
            wtxn.commit().map_err(internal)?;
        }
        Ok(Self { db: Arc::new(db) })
    }

    fn all_items(&self) -> Result<Vec<WorkItem>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let table = rtxn.open_table(ITEMS).map_err(internal)?;
        let mut out = Vec::new();
        for entry in table.iter().map_err(internal)? {
            let (_k, v) = entry.map_err(internal)?;
            out.push(serde_json::from_slice(v.value())?);
        }
        Ok(out)
    }

    fn write_item(&self, item: &WorkItem) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(item)?;
        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut table = wtxn.open_table(ITEMS).map_err(internal)?;
            table
                .insert(item.id.as_u64(), bytes.as_slice())
                .map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(())
    }
}

#[async_trait]
impl WorkItemStore for RedbWorkItemStore {
    async fn persist(&self, mut item: WorkItem) -> Result<WorkItem, StoreError> {
        let wtxn = self.db.begin_write().map_err(internal)?;
        let id = {
            let mut meta = wtxn.open_table(META).map_err(internal)?;
            let next = meta
                .get("next_id")
                .map_err(internal)?
                .map(|g| g.value())
                .unwrap_or(0)
                + 1;
            meta.insert("next_id", next).map_err(internal)?;
            next
        };
        item.id = WorkItemId(id);
        item.step = Step::Scheduled;
        item.times_tried = 0;
        item.time_to_try = 0;
        let bytes = serde_json::to_vec(&item)?;
        {
            let mut table = wtxn.open_table(ITEMS).map_err(internal)?;
            table.insert(id, bytes.as_slice()).map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(item)
    }

    async fn take(&self, server_id: &str) -> Result<Option<WorkItem>, StoreError> {
        let now = now_secs();
        let wtxn = self.db.begin_write().map_err(internal)?;
        let chosen = {
            let table = wtxn.open_table(ITEMS).map_err(internal)?;
            let mut best: Option<WorkItem> = None;
            for entry in table.iter().map_err(internal)? {
                let (_k, v) = entry.map_err(internal)?;
                let item: WorkItem = serde_json::from_slice(v.value())?;
                if item.server_id.is_some() || item.time_to_try > now {
                    continue;
                }
                best = match best {
                    None => Some(item),
                    Some(b) if (item.time_to_try, item.id) < (b.time_to_try, b.id) => Some(item),
                    Some(b) => Some(b),
                };
            }
            best
        };

        let Some(mut item) = chosen else {
            return Ok(None);
        };
        item.server_id = Some(server_id.to_string());
        item.date_taken = Some(now);
        let bytes = serde_json::to_vec(&item)?;
        {
            let mut table = wtxn.open_table(ITEMS).map_err(internal)?;
            table
                .insert(item.id.as_u64(), bytes.as_slice())
                .map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(Some(item))
    }

    async fn update(&self, item: &WorkItem) -> Result<(), StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let exists = {
            let table = rtxn.open_table(ITEMS).map_err(internal)?;
            table.get(item.id.as_u64()).map_err(internal)?.is_some()
        };
        if !exists {
            return Err(StoreError::NotFound(item.id.as_u64()));
        }
        self.write_item(item)
    }

    async fn has_been_scheduled(&self, vm_id: &VmId, work_type: WorkType) -> Result<bool, StoreError> {
        Ok(self
            .all_items()?
            .iter()
            .any(|i| i.instance_id == *vm_id && i.work_type == work_type && !i.step.is_terminal()))
    }

    async fn list_pending_ha_work_for_vm(&self, vm_id: &VmId) -> Result<Vec<WorkItem>, StoreError> {
        Ok(self
            .all_items()?
            .into_iter()
            .filter(|i| i.instance_id == *vm_id && i.work_type == WorkType::Ha && !i.step.is_terminal())
            .collect())
    }

    async fn list_pending_migrations_for_vm(
        &self,
        vm_id: &VmId,
    ) -> Result<Vec<WorkItem>, StoreError> {
        Ok(self
            .all_items()?
            .into_iter()
            .filter(|i| {
                i.instance_id == *vm_id && i.work_type == WorkType::Migration && !i.step.is_terminal()
            })
            .collect())
    }

    async fn find_previous_ha(&self, vm_id: &VmId) -> Result<Option<WorkItem>, StoreError> {
        Ok(self
            .all_items()?
            .into_iter()
            .filter(|i| i.instance_id == *vm_id && i.work_type == WorkType::Ha)
            .max_by_key(|i| i.id))
    }

    async fn list_future_ha_work_for_vm(
        &self,
        vm_id: &VmId,
        exclude_id: WorkItemId,
    ) -> Result<Vec<WorkItem>, StoreError> {
        Ok(self
            .all_items()?
            .into_iter()
            .filter(|i| {
                i.instance_id == *vm_id
                    && i.work_type == WorkType::Ha
                    && !i.step.is_terminal()
                    && i.id > exclude_id
            })
            .collect())
    }

    async fn list_running_ha_work_for_vm(&self, vm_id: &VmId) -> Result<Vec<WorkItem>, StoreError> {
        Ok(self
            .all_items()?
            .into_iter()
            .filter(|i| {
                i.instance_id == *vm_id
                    && i.work_type == WorkType::Ha
                    && !i.step.is_terminal()
                    && i.is_taken()
            })
            .collect())
    }

    async fn find_taken_work_items(&self, work_type: WorkType) -> Result<Vec<WorkItem>, StoreError> {
        Ok(self
            .all_items()?
            .into_iter()
            .filter(|i| i.work_type == work_type && i.is_taken())
            .collect())
    }

    async fn delete_migration_work_items(
        &self,
        host_id: &HostId,
        work_type: WorkType,
        server_id: &str,
    ) -> Result<(), StoreError> {
        let victims: Vec<WorkItemId> = self
            .all_items()?
            .into_iter()
            .filter(|i| {
                i.work_type == work_type
                    && i.host_id.as_ref() == Some(host_id)
                    && i.server_id.as_deref() == Some(server_id)
            })
            .map(|i| i.id)
            .collect();
        self.remove_ids(&victims)?;
        Ok(())
    }

    async fn release_work_items(&self, server_id: &str) -> Result<usize, StoreError> {
        let mut count = 0;
        for mut item in self.all_items()? {
            if item.server_id.as_deref() == Some(server_id) {
                item.server_id = None;
                item.date_taken = None;
                self.write_item(&item)?;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn mark_pending_works_as_investigating(&self) -> Result<usize, StoreError> {
        let mut count = 0;
        for mut item in self.all_items()? {
            if item.step == Step::Investigating && item.is_taken() {
                item.server_id = None;
                item.date_taken = None;
                self.write_item(&item)?;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn mark_server_pending_works_as_investigating(
        &self,
        server_id: &str,
    ) -> Result<usize, StoreError> {
        let mut count = 0;
        for mut item in self.all_items()? {
            if item.step == Step::Investigating && item.server_id.as_deref() == Some(server_id) {
                item.server_id = None;
                item.date_taken = None;
                self.write_item(&item)?;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn cleanup(&self, older_than: u64) -> Result<usize, StoreError> {
        let victims: Vec<WorkItemId> = self
            .all_items()?
            .into_iter()
            .filter(|i| i.step.is_terminal() && i.completed_at.is_some_and(|t| t <= older_than))
            .map(|i| i.id)
            .collect();
        self.remove_ids(&victims)
    }

    async fn expunge_by_vm_list(&self, vm_ids: &[VmId], batch_size: usize) -> Result<usize, StoreError> {
        let victims: Vec<WorkItemId> = self
            .all_items()?
            .into_iter()
            .filter(|i| vm_ids.contains(&i.instance_id))
            .take(batch_size)
            .map(|i| i.id)
            .collect();
        self.remove_ids(&victims)
    }

    async fn delete(&self, vm_id: &VmId, work_type: WorkType) -> Result<(), StoreError> {
        let victims: Vec<WorkItemId> = self
            .all_items()?
            .into_iter()
            .filter(|i| i.instance_id == *vm_id && i.work_type == work_type)
            .map(|i| i.id)
            .collect();
        self.remove_ids(&victims)?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<WorkItem>, StoreError> {
        self.all_items()
    }
}

impl RedbWorkItemStore {
    fn remove_ids(&self, ids: &[WorkItemId]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut table = wtxn.open_table(ITEMS).map_err(internal)?;
            for id in ids {
                table.remove(id.as_u64()).map_err(internal)?;
            }
        }
        wtxn.commit().map_err(internal)?;
        Ok(ids.len())
    }
}
