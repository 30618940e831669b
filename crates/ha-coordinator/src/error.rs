use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("store error: {0}")]
    Store(#[from] ha_store::StoreError),

    #[error("orchestrator error: {0}")]
    Orchestrator(#[from] ha_orchestrator::OrchestratorError),

    #[error("domain error: {0}")]
    Domain(#[from] ha_domain::DomainError),

    #[error("internal coordinator error: {0}")]
    Internal(String),
}
