pub mod error;
pub mod types;

mod tests;

pub use error::DomainError;
pub use types::{
    FenceResult, Host, HostId, HostStatus, InstanceType, ReasonType, Step, Vm, VmId, VmLiveness,
    VmState, WorkItem, WorkItemId, WorkType, ZoneId,
};
