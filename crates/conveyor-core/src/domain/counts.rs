//! Per-state job counters for the monitoring read API.

use serde::{Deserialize, Serialize};

use super::JobState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub waiting: usize,
    pub delayed: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobCounts {
    pub fn record(&mut self, state: JobState) {
        match state {
            JobState::Waiting => self.waiting += 1,
            JobState::Delayed => self.delayed += 1,
            JobState::Active => self.active += 1,
            JobState::Completed => self.completed += 1,
            JobState::Failed => self.failed += 1,
        }
    }

    /// Number of records currently in the store. Purged jobs are gone, so
    /// they are not counted anywhere.
    pub fn total(&self) -> usize {
        self.waiting + self.delayed + self.active + self.completed + self.failed
    }
}
