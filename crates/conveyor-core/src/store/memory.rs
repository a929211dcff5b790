//! In-memory store implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{JobStore, Mutation, TransitionOutcome};
use crate::domain::{JobCounts, JobId, JobRecord, JobState};
use crate::error::StoreError;

/// Store backed by a single mutex'd map.
///
/// The map is keyed by [`JobId`]; ULIDs order by creation time, so iteration
/// is already near-FIFO and `list_by_states` only has to settle `created_at`
/// ties. Every operation takes the one lock, which is what makes `transition`
/// atomic.
pub struct MemoryStore {
    jobs: Mutex<BTreeMap<JobId, JobRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(BTreeMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create(&self, record: JobRecord) -> Result<JobId, StoreError> {
        let mut jobs = self.jobs.lock().await;
        let id = record.id;
        if jobs.contains_key(&id) {
            return Err(StoreError::DuplicateId(id));
        }
        jobs.insert(id, record);
        Ok(id)
    }

    async fn get(&self, id: JobId) -> Result<Option<JobRecord>, StoreError> {
        let jobs = self.jobs.lock().await;
        Ok(jobs.get(&id).cloned())
    }

    async fn transition(
        &self,
        id: JobId,
        from: JobState,
        to: JobState,
        mutate: Mutation,
    ) -> Result<TransitionOutcome, StoreError> {
        if !from.can_transition_to(to) {
            return Err(StoreError::InvalidTransition { from, to });
        }

        let mut jobs = self.jobs.lock().await;
        let Some(record) = jobs.get_mut(&id) else {
            return Ok(TransitionOutcome::NotFound);
        };
        if record.state != from {
            return Ok(TransitionOutcome::Conflict {
                actual: record.state,
            });
        }

        mutate(record);
        // The transition owns the state field; a misbehaving mutation cannot
        // move the record somewhere else.
        record.state = to;
        Ok(TransitionOutcome::Applied(record.clone()))
    }

    async fn list_by_states(
        &self,
        queue_name: &str,
        states: &[JobState],
    ) -> Result<Vec<JobRecord>, StoreError> {
        let jobs = self.jobs.lock().await;
        let mut matched: Vec<JobRecord> = jobs
            .values()
            .filter(|r| r.queue_name == queue_name && states.contains(&r.state))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(matched)
    }

    async fn purge(&self, id: JobId) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().await;
        jobs.remove(&id);
        Ok(())
    }

    async fn counts(&self, queue_name: &str) -> Result<JobCounts, StoreError> {
        let jobs = self.jobs.lock().await;
        let mut counts = JobCounts::default();
        for record in jobs.values() {
            if record.queue_name == queue_name {
                counts.record(record.state);
            }
        }
        Ok(counts)
    }
}
