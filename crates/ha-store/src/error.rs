use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("work item not found: {0}")]
    NotFound(u64),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal store error: {0}")]
    Internal(String),

    /// Returned by `update` when the caller's copy no longer matches the
    /// persisted lease holder — someone else claimed or released it first.
    #[error("lease conflict on work item {id}: held by {holder:?}")]
    LeaseConflict { id: u64, holder: Option<String> },
}
