//! Reliable job-queue fetch layer.
//!
//! Pulls jobs from named source queues in a shared store into a
//! per-process working queue, keeps a TTL'd heartbeat alive so peers can
//! tell live workers from dead ones, and reclaims work abandoned by
//! processes that died without acknowledging it. Delivery is at-least-once;
//! job handlers downstream must tolerate duplicates.
//!
//! Two interchangeable strategies are provided: [`config::Strategy::Reliable`]
//! (atomic source-to-working-queue move, no crash window) and
//! [`config::Strategy::SemiReliable`] (blocking pop then separate push,
//! with a small documented crash window between the two steps).

pub mod cleanup;
pub mod config;
pub mod context;
pub mod error;
pub mod fetcher;
pub mod heartbeat;
pub mod requeue;
pub mod unit_of_work;

pub use cleanup::OrphanCleaner;
pub use config::{FetchConfig, Strategy, SEMI_RELIABLE_FETCH_TIMEOUT_ENV};
pub use context::WorkerContext;
pub use error::{FetchError, Result};
pub use fetcher::Fetcher;
pub use heartbeat::{Heartbeat, HeartbeatHandle};
pub use requeue::bulk_requeue;
pub use unit_of_work::UnitOfWork;

pub use reliable_fetch_core::{
    Job, JobTypeConfig, JobTypeRegistry, WorkerIdentity, DEFAULT_MAX_INTERRUPTIONS,
    INTERRUPTIONS_UNLIMITED,
};
pub use reliable_fetch_store::{ListStore, MemoryStore, RedisStore};
