pub mod cleanup;
pub mod error;
pub mod fence;
pub mod gate;
pub mod investigate;
pub mod peer;
pub mod plan;
pub mod recovery;
pub mod scheduler;
pub mod scheduler_types;
pub mod worker;

pub use cleanup::CleanupTask;
pub use error::CoordinatorError;
pub use fence::{AlwaysSucceedsFencer, Fencer};
pub use gate::FeatureGate;
pub use investigate::{AbstainingInvestigator, Investigator};
pub use peer::{PeerCoordinator, PeerEvent};
pub use plan::start_with_fallback;
pub use recovery::RecoveryEngine;
pub use scheduler::SchedulerApi;
pub use scheduler_types::{ScheduleError, StatusCount, StatusReport};
pub use worker::WorkerPool;
