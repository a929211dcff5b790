//! Job state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a job.
///
/// Transitions:
/// - Delayed -> Waiting (promotion once `delay_until` has passed)
/// - Waiting -> Active (claimed by a dispatcher)
/// - Active -> Completed (processor succeeded)
/// - Active -> Waiting (failure with attempts left, or forced abort)
/// - Active -> Delayed (failure with attempts left and a backoff delay)
/// - Active -> Failed (failure at the attempt ceiling)
///
/// Completed and Failed are terminal. A Completed record may additionally be
/// purged when `remove_on_complete` was set, which deletes it outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Eligible for claiming on the next dispatch cycle.
    Waiting,

    /// Not eligible before `delay_until`.
    Delayed,

    /// Claimed; a processor invocation is in flight.
    Active,

    /// Processor succeeded.
    Completed,

    /// Failed permanently (attempt ceiling reached).
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Whether `self -> to` is a legal transition. The store rejects anything
    /// outside this set, so no caller can skip Active or resurrect a terminal
    /// job.
    pub fn can_transition_to(self, to: JobState) -> bool {
        matches!(
            (self, to),
            (JobState::Delayed, JobState::Waiting)
                | (JobState::Waiting, JobState::Active)
                | (JobState::Active, JobState::Completed)
                | (JobState::Active, JobState::Waiting)
                | (JobState::Active, JobState::Delayed)
                | (JobState::Active, JobState::Failed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(JobState::Delayed, JobState::Waiting, true)]
    #[case(JobState::Waiting, JobState::Active, true)]
    #[case(JobState::Active, JobState::Completed, true)]
    #[case(JobState::Active, JobState::Waiting, true)]
    #[case(JobState::Active, JobState::Delayed, true)]
    #[case(JobState::Active, JobState::Failed, true)]
    #[case(JobState::Waiting, JobState::Completed, false)]
    #[case(JobState::Waiting, JobState::Failed, false)]
    #[case(JobState::Delayed, JobState::Active, false)]
    #[case(JobState::Completed, JobState::Waiting, false)]
    #[case(JobState::Failed, JobState::Waiting, false)]
    #[case(JobState::Completed, JobState::Failed, false)]
    fn transition_whitelist(#[case] from: JobState, #[case] to: JobState, #[case] legal: bool) {
        assert_eq!(from.can_transition_to(to), legal);
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Waiting.is_terminal());
        assert!(!JobState::Delayed.is_terminal());
        assert!(!JobState::Active.is_terminal());
    }
}
