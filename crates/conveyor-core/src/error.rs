use thiserror::Error;

use crate::domain::{JobId, JobState};

/// Errors surfaced to producers and operators.
///
/// Claim contention is deliberately absent: a lost claim race is
/// `TransitionOutcome::Conflict`, which the dispatcher absorbs and never
/// reports.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Payload did not match the queue's schema. Rejected before any durable
    /// write.
    #[error("invalid payload for queue '{queue}': {reason}")]
    Validation { queue: String, reason: String },

    #[error("queue '{0}' is already registered")]
    DuplicateQueue(String),

    #[error("queue '{0}' is not registered")]
    QueueNotFound(String),

    #[error("no processor registered for queue '{0}'")]
    NoProcessorRegistered(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from the durable store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend unreachable. The dispatcher backs off and retries on this; it
    /// never crashes the process.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A record with this id already exists. Ids come from the generator and
    /// must never repeat.
    #[error("duplicate job id {0}")]
    DuplicateId(JobId),

    /// Caller asked for a transition outside the state machine. Always a bug
    /// in the caller, never applied.
    #[error("illegal state transition {from:?} -> {to:?}")]
    InvalidTransition { from: JobState, to: JobState },
}

/// Outcome of one failed processor invocation, recorded on the job as
/// `last_error`. Panics and timeouts are converted into this by the worker
/// slot, so no job is ever stranded in Active.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ProcessFailure(pub String);

impl ProcessFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
