mod error;
mod identity;
mod job;
mod registry;

pub use error::{JobError, Result};
pub use identity::{
    heartbeat_key, identity_from_key, queue_key, working_queue_key, working_queue_pattern,
    WorkerIdentity, HEARTBEAT_PREFIX, QUEUE_PREFIX, WORKING_QUEUE_PREFIX,
};
pub use job::Job;
pub use registry::{ExhaustionCallback, JobTypeConfig, JobTypeRegistry};

/// Global fallback for how many interruptions a job survives before it is
/// diverted to the interrupted holding list.
pub const DEFAULT_MAX_INTERRUPTIONS: i64 = 3;

/// Sentinel disabling the interruption budget for a job type.
pub const INTERRUPTIONS_UNLIMITED: i64 = -1;
