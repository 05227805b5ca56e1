use reliable_fetch_core::JobError;
use reliable_fetch_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Store operation failed: {0}")]
    Store(#[from] StoreError),

    #[error("Job payload error: {0}")]
    Job(#[from] JobError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, FetchError>;
