//! Domain model: identifiers, job records, states, options, counts.

pub mod counts;
pub mod ids;
pub mod options;
pub mod record;
pub mod state;

pub use counts::JobCounts;
pub use ids::{IdGenerator, JobId, UlidGenerator};
pub use options::JobOptions;
pub use record::JobRecord;
pub use state::JobState;
