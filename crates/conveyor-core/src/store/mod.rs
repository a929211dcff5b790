//! Durable store contract.
//!
//! The store is the only arbiter of job state. `transition` is a
//! compare-and-swap on the state field: it fails with a conflict when the
//! record is no longer in the expected state. That conflict is the whole
//! concurrency story: two dispatchers racing for the same job cannot both
//! win, and no extra locking is needed to add dispatchers or nodes.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::domain::{JobCounts, JobId, JobRecord, JobState};
use crate::error::StoreError;

/// Field updates applied atomically with a state transition. The mutation may
/// touch any field except `state`, which belongs to the transition itself.
pub type Mutation = Box<dyn FnOnce(&mut JobRecord) + Send>;

/// Result of a compare-and-swap transition.
#[derive(Debug)]
pub enum TransitionOutcome {
    /// Swap applied; the returned record is the post-transition snapshot.
    Applied(JobRecord),

    /// The record was not in the expected state. Expected contention, not an
    /// error.
    Conflict { actual: JobState },

    /// No record with that id (possibly already purged).
    NotFound,
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }
}

/// Persistence seam. The bundled [`MemoryStore`] serves tests and demos; any
/// backend honoring the atomic `transition` contract can replace it.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new record. The id must be unique for the store's lifetime.
    async fn create(&self, record: JobRecord) -> Result<JobId, StoreError>;

    async fn get(&self, id: JobId) -> Result<Option<JobRecord>, StoreError>;

    /// Atomically move a record from `from` to `to`, applying `mutate` in the
    /// same step. Pairs outside the state machine are rejected with
    /// [`StoreError::InvalidTransition`] before anything is read.
    async fn transition(
        &self,
        id: JobId,
        from: JobState,
        to: JobState,
        mutate: Mutation,
    ) -> Result<TransitionOutcome, StoreError>;

    /// Records of one queue in any of `states`, FIFO by `(created_at, id)`.
    async fn list_by_states(
        &self,
        queue_name: &str,
        states: &[JobState],
    ) -> Result<Vec<JobRecord>, StoreError>;

    /// Delete a record outright. Deleting an absent id is a no-op.
    async fn purge(&self, id: JobId) -> Result<(), StoreError>;

    async fn counts(&self, queue_name: &str) -> Result<JobCounts, StoreError>;
}
