use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid vm id: {0}")]
    InvalidVmId(String),

    #[error("invalid host id: {0}")]
    InvalidHostId(String),

    #[error("invalid zone id: {0}")]
    InvalidZoneId(String),

    #[error("work item {id} already taken by server {server_id}")]
    AlreadyTaken { id: u64, server_id: String },

    #[error("work type {work_type} is not valid for a stop schedule")]
    InvalidStopWorkType { work_type: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
