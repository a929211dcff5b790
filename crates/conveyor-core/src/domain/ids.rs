//! Job identifiers.
//!
//! Ids are ULIDs: lexicographic order follows creation time, so the id doubles
//! as the FIFO tie-break when two jobs share a `created_at` stamp, and ids can
//! be generated on any node without coordination.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::clock::Clock;

/// Unique identifier of one job, assigned at creation and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Ulid);

impl JobId {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl From<Ulid> for JobId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Id generation seam; swap in a deterministic source for tests if needed.
pub trait IdGenerator: Send + Sync {
    fn next_job_id(&self) -> JobId;
}

impl<G: IdGenerator + ?Sized> IdGenerator for Arc<G> {
    fn next_job_id(&self) -> JobId {
        (**self).next_job_id()
    }
}

/// ULID generator driven by a [`Clock`].
///
/// The timestamp half of the ULID comes from the clock, so ids generated under
/// a pinned test clock still sort together with their creation instant.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn next_job_id(&self) -> JobId {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        JobId::from_ulid(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};
    use chrono::TimeZone;
    use chrono::Utc;

    #[test]
    fn generated_ids_are_unique() {
        let ids = UlidGenerator::new(SystemClock);

        let a = ids.next_job_id();
        let b = ids.next_job_id();
        let c = ids.next_job_id();

        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }

    #[test]
    fn ids_sort_by_creation_time() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let ids = UlidGenerator::new(Arc::clone(&clock));

        let first = ids.next_job_id();
        clock.advance(chrono::Duration::milliseconds(5));
        let second = ids.next_job_id();
        clock.advance(chrono::Duration::milliseconds(5));
        let third = ids.next_job_id();

        assert!(first < second);
        assert!(second < third);
    }

    #[test]
    fn pinned_clock_pins_the_timestamp_part() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let ids = UlidGenerator::new(ManualClock::new(start));

        let a = ids.next_job_id();
        let b = ids.next_job_id();

        assert_ne!(a, b);
        assert_eq!(a.as_ulid().timestamp_ms(), b.as_ulid().timestamp_ms());
        assert_eq!(a.as_ulid().timestamp_ms(), start.timestamp_millis() as u64);
    }

    #[test]
    fn display_uses_job_prefix() {
        let id = JobId::from_ulid(Ulid::new());
        assert!(id.to_string().starts_with("job-"));
    }

    #[test]
    fn serde_roundtrip() {
        let id = JobId::from_ulid(Ulid::new());
        let json = serde_json::to_string(&id).unwrap();
        let back: JobId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
