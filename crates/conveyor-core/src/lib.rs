//! conveyor-core
//!
//! A from-scratch job-queue core: named, typed queues over a pluggable
//! durable store, with delayed jobs, attempt-counted retries, and
//! concurrency-bounded dispatch.
//!
//! # Module map
//! - **domain**: job records, states, ids, options, counts
//! - **store**: the durable-store contract ([`JobStore`]) and the bundled
//!   in-memory implementation
//! - **processor**: the typed processor seam ([`Processor`]) and its
//!   object-safe erasure
//! - **queue**: named channel owning enqueue, reads, and processor slot
//! - **dispatch**: per-queue scheduler loop and worker pool
//! - **manager**: registry of queues for one running system
//! - **batch**: bounded-concurrency bulk submission
//! - **retry** / **clock**: backoff policy and the injected time source
//!
//! The store is the single source of truth for job state. Claiming a job is a
//! compare-and-swap state transition, so multiple dispatchers (in or across
//! processes) can share a store without double-processing anything.

pub mod batch;
pub mod clock;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod manager;
pub mod processor;
pub mod queue;
pub mod retry;
pub mod store;

pub use batch::submit_batch;
pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatch::{ProcessingHandle, StopMode};
pub use domain::{IdGenerator, JobCounts, JobId, JobOptions, JobRecord, JobState, UlidGenerator};
pub use error::{ProcessFailure, QueueError, StoreError};
pub use manager::QueueManager;
pub use processor::{ActiveJob, Payload, Processor};
pub use queue::{Queue, QueueSettings};
pub use retry::RetryPolicy;
pub use store::{JobStore, MemoryStore, TransitionOutcome};
