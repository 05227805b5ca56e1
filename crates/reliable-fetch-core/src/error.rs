use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Malformed job payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, JobError>;
