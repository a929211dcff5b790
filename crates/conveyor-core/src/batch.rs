//! Bounded-concurrency batch submission.
//!
//! Bulk producers get an explicit concurrency bound and a per-item verdict;
//! one bad payload fails that item, not the batch, and no error is swallowed.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::domain::{JobId, JobOptions};
use crate::error::{QueueError, StoreError};
use crate::queue::Queue;

/// Submit many jobs with at most `limit` in-flight `add_job` calls. Results
/// come back in input order, one per item.
pub async fn submit_batch(
    queue: &Arc<Queue>,
    items: Vec<(serde_json::Value, JobOptions)>,
    limit: usize,
) -> Vec<Result<JobId, QueueError>> {
    let total = items.len();
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut submissions: JoinSet<(usize, Result<JobId, QueueError>)> = JoinSet::new();

    for (index, (payload, options)) in items.into_iter().enumerate() {
        let queue = Arc::clone(queue);
        let semaphore = Arc::clone(&semaphore);
        submissions.spawn(async move {
            // The semaphore is never closed, so this permit always arrives.
            let _permit = semaphore.acquire_owned().await.ok();
            (index, queue.add_job(payload, options).await)
        });
    }

    let mut results: Vec<Option<Result<JobId, QueueError>>> =
        std::iter::repeat_with(|| None).take(total).collect();
    while let Some(joined) = submissions.join_next().await {
        if let Ok((index, result)) = joined {
            results[index] = Some(result);
        }
    }

    results
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| {
                Err(QueueError::Store(StoreError::Unavailable(
                    "submission task failed".into(),
                )))
            })
        })
        .collect()
}
