//! Job record: immutable description of one unit of work plus its execution
//! state.
//!
//! The record lives in the store, which is the single source of truth; nothing
//! in process memory shadows it. All state changes go through the store's
//! `transition`, so the helpers here only touch the non-state fields a
//! transition is allowed to mutate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{JobId, JobOptions, JobState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub queue_name: String,
    pub payload: serde_json::Value,
    pub state: JobState,

    /// Executions made so far, including the in-flight one while Active.
    pub attempts_made: u32,
    pub max_attempts: u32,

    /// Earliest dispatch eligibility; set while Delayed, cleared on promotion.
    pub delay_until: Option<DateTime<Utc>>,
    pub remove_on_complete: bool,

    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Message from the most recent failed attempt.
    pub last_error: Option<String>,
}

impl JobRecord {
    /// Build a fresh record. Initial state is Delayed iff a positive delay was
    /// requested, otherwise Waiting.
    pub fn new(
        id: JobId,
        queue_name: impl Into<String>,
        payload: serde_json::Value,
        options: &JobOptions,
        now: DateTime<Utc>,
    ) -> Self {
        let delay_until = (!options.delay.is_zero()).then(|| {
            chrono::Duration::from_std(options.delay)
                .ok()
                .and_then(|d| now.checked_add_signed(d))
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        });
        let state = if delay_until.is_some() {
            JobState::Delayed
        } else {
            JobState::Waiting
        };

        Self {
            id,
            queue_name: queue_name.into(),
            payload,
            state,
            attempts_made: 0,
            max_attempts: options.max_attempts.max(1),
            delay_until,
            remove_on_complete: options.remove_on_complete,
            created_at: now,
            processed_at: None,
            finished_at: None,
            last_error: None,
        }
    }

    /// Applied inside the Waiting -> Active claim transition.
    pub fn begin_attempt(&mut self, now: DateTime<Utc>) {
        self.attempts_made += 1;
        self.processed_at = Some(now);
    }

    /// Applied inside the Active -> Completed transition.
    pub fn finish(&mut self, now: DateTime<Utc>) {
        self.finished_at = Some(now);
    }

    /// Applied inside the Delayed -> Waiting promotion.
    pub fn promote(&mut self) {
        self.delay_until = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;
    use ulid::Ulid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn zero_delay_starts_waiting() {
        let record = JobRecord::new(
            JobId::from_ulid(Ulid::new()),
            "orders",
            serde_json::json!({"n": 1}),
            &JobOptions::default(),
            now(),
        );

        assert_eq!(record.state, JobState::Waiting);
        assert_eq!(record.delay_until, None);
        assert_eq!(record.attempts_made, 0);
        assert_eq!(record.created_at, now());
    }

    #[test]
    fn positive_delay_starts_delayed_with_due_time() {
        let options = JobOptions::default().with_delay(Duration::from_secs(5));
        let record = JobRecord::new(
            JobId::from_ulid(Ulid::new()),
            "orders",
            serde_json::json!({}),
            &options,
            now(),
        );

        assert_eq!(record.state, JobState::Delayed);
        assert_eq!(record.delay_until, Some(now() + chrono::Duration::seconds(5)));
    }

    #[test]
    fn begin_attempt_counts_and_stamps() {
        let mut record = JobRecord::new(
            JobId::from_ulid(Ulid::new()),
            "orders",
            serde_json::json!({}),
            &JobOptions::default().with_max_attempts(3),
            now(),
        );

        let claimed_at = now() + chrono::Duration::seconds(1);
        record.begin_attempt(claimed_at);

        assert_eq!(record.attempts_made, 1);
        assert_eq!(record.processed_at, Some(claimed_at));
        assert_eq!(record.finished_at, None);
    }
}
