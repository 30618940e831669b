pub mod error;
pub mod local;
pub mod orchestrator;

pub use error::OrchestratorError;
pub use local::{FixedPlanner, LocalOrchestrator};
pub use orchestrator::{
    AlertManager, AlertType, DataStoreDriver, Orchestrator, Planner, ResourceManager, StartParams,
    VolumeOrchestrator,
};
