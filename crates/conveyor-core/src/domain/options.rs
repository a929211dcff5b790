//! Per-job submission options.

use std::time::Duration;

/// Options accepted by `add_job`.
#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Time the job must wait before becoming eligible for dispatch.
    /// Zero means immediately eligible.
    pub delay: Duration,

    /// Execution ceiling. The job fails terminally once this many attempts
    /// have been made. Clamped to at least 1.
    pub max_attempts: u32,

    /// Purge the record on success instead of keeping it in Completed.
    pub remove_on_complete: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            max_attempts: 1,
            remove_on_complete: false,
        }
    }
}

impl JobOptions {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_remove_on_complete(mut self, remove: bool) -> Self {
        self.remove_on_complete = remove;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_single_attempt_no_delay() {
        let opts = JobOptions::default();
        assert_eq!(opts.delay, Duration::ZERO);
        assert_eq!(opts.max_attempts, 1);
        assert!(!opts.remove_on_complete);
    }

    #[test]
    fn max_attempts_cannot_be_zero() {
        let opts = JobOptions::default().with_max_attempts(0);
        assert_eq!(opts.max_attempts, 1);
    }
}
