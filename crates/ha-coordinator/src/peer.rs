use std::sync::Arc;

use ha_store::WorkItemStore;
use tracing::info;

/// A management-peer lifecycle transition, as delivered by the cluster
/// membership layer.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    Joined(String),
    Left(String),
    Isolated(String),
}

/// Releases a departed peer's leased work so it becomes re-claimable by the
/// remaining peers. Joins and isolation events are observed but otherwise
/// have no effect on the store — there is nothing to release.
pub struct PeerCoordinator {
    store: Arc<dyn WorkItemStore>,
}

impl PeerCoordinator {
    pub fn new(store: Arc<dyn WorkItemStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, event: PeerEvent) -> Result<(), crate::CoordinatorError> {
        match event {
            PeerEvent::Left(peer_id) => {
                let released = self.store.release_work_items(&peer_id).await?;
                info!(peer_id, released, "released work items for departed peer");
            }
            PeerEvent::Joined(peer_id) => {
                info!(peer_id, "peer joined");
            }
            PeerEvent::Isolated(peer_id) => {
                info!(peer_id, "peer isolated");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_domain::{HostId, InstanceType, ReasonType, VmId, VmState, WorkType};
    use ha_store::InMemoryWorkItemStore;

    #[tokio::test]
    async fn peer_left_releases_its_leases() {
        let store = Arc::new(InMemoryWorkItemStore::new());
        let item = ha_domain::WorkItem::new(
            VmId::new("vm-1"),
            InstanceType::User,
            WorkType::Ha,
            Some(HostId::new("host-1")),
            VmState::Running,
            1,
            ReasonType::HostDown,
            0,
        );
        store.persist(item).await.unwrap();
        store.take("peer-a").await.unwrap();

        let coordinator = PeerCoordinator::new(store.clone());
        coordinator.handle(PeerEvent::Left("peer-a".to_string())).await.unwrap();

        assert!(store.take("peer-b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn join_and_isolated_events_do_not_touch_the_store() {
        let store = Arc::new(InMemoryWorkItemStore::new());
        let coordinator = PeerCoordinator::new(store.clone());

        coordinator.handle(PeerEvent::Joined("peer-a".to_string())).await.unwrap();
        coordinator.handle(PeerEvent::Isolated("peer-b".to_string())).await.unwrap();
    }
}
