use thiserror::Error;

/// Failures surfaced by the external collaborators the coordinator core
/// depends on but does not implement (the real VM orchestrator, storage
/// layer, and alerting system).
#[derive(Debug, Error, Clone)]
pub enum OrchestratorError {
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("operation timed out: {0}")]
    OperationTimedOut(String),

    #[error("concurrent operation detected: {0}")]
    ConcurrentOperation(String),

    #[error("insufficient capacity: {0}")]
    InsufficientCapacity(String),

    #[error("agent unavailable: {0}")]
    AgentUnavailable(String),

    #[error("internal orchestrator error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// True for failures the recovery state machine should reschedule rather
    /// than treat as a hard stop (§7: everything except a programming error).
    pub fn is_retryable(&self) -> bool {
        !matches!(self, OrchestratorError::Internal(_))
    }
}
