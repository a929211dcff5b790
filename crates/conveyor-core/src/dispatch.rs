//! Dispatch loop and worker pool.
//!
//! One loop runs per processing queue. Every tick it promotes due Delayed
//! jobs, claims Waiting jobs oldest-first while worker slots are free, and
//! spawns one slot task per claim. Claiming goes through the store's
//! compare-and-swap transition, so two loops over the same store never
//! double-process a job; a lost race is skipped, and the next tick re-lists
//! from the front so the loser never leapfrogs older unclaimed jobs.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, warn};

use crate::clock::Clock;
use crate::domain::{JobId, JobRecord, JobState};
use crate::error::{ProcessFailure, StoreError};
use crate::queue::Queue;
use crate::store::TransitionOutcome;

/// How to stop a dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Stop claiming, let in-flight jobs finish (bounded by the queue's drain
    /// timeout, after which they are aborted and released).
    Graceful,

    /// Abort in-flight invocations and put their jobs back to Waiting. The
    /// aborted execution is not counted as an attempt.
    Forced,
}

type InFlight = Arc<StdMutex<HashSet<JobId>>>;

/// Handle to one queue's running dispatch loop.
pub struct ProcessingHandle {
    queue: Arc<Queue>,
    shutdown: watch::Sender<Option<StopMode>>,
    join: JoinHandle<()>,
    in_flight: InFlight,
}

impl fmt::Debug for ProcessingHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingHandle")
            .field("queue", &self.queue.name())
            .finish_non_exhaustive()
    }
}

impl ProcessingHandle {
    pub async fn stop(mut self, mode: StopMode) {
        let _ = self.shutdown.send(Some(mode));
        match mode {
            StopMode::Graceful => {
                let drain = self.queue.settings().drain_timeout;
                if tokio::time::timeout(drain, &mut self.join).await.is_err() {
                    warn!(
                        queue = %self.queue.name(),
                        "drain timeout exceeded, aborting in-flight jobs"
                    );
                    self.join.abort();
                    let _ = self.join.await;
                    release_in_flight(&self.queue, &self.in_flight).await;
                }
            }
            StopMode::Forced => {
                // The loop aborts its own slots and releases their jobs.
                let _ = (&mut self.join).await;
            }
        }
    }
}

pub(crate) fn spawn(queue: Arc<Queue>, concurrency: usize) -> ProcessingHandle {
    let (shutdown, shutdown_rx) = watch::channel(None);
    let in_flight: InFlight = Arc::new(StdMutex::new(HashSet::new()));
    let join = tokio::spawn(run_loop(
        Arc::clone(&queue),
        concurrency.max(1),
        shutdown_rx,
        Arc::clone(&in_flight),
    ));
    ProcessingHandle {
        queue,
        shutdown,
        join,
        in_flight,
    }
}

async fn run_loop(
    queue: Arc<Queue>,
    concurrency: usize,
    mut shutdown: watch::Receiver<Option<StopMode>>,
    in_flight: InFlight,
) {
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut slots: JoinSet<()> = JoinSet::new();
    let mut store_failures: u32 = 0;
    let poll = queue.settings().poll_interval;
    debug!(queue = %queue.name(), concurrency, "dispatch loop started");

    let mode = loop {
        if let Some(mode) = *shutdown.borrow() {
            break mode;
        }

        match dispatch_once(&queue, &semaphore, &in_flight, &mut slots).await {
            Ok(()) => store_failures = 0,
            Err(e) => {
                // StoreUnavailable policy: back off and retry indefinitely,
                // the store owns durability and we own patience.
                store_failures += 1;
                let backoff = store_backoff(store_failures);
                warn!(
                    queue = %queue.name(),
                    error = %e,
                    failures = store_failures,
                    "store error in dispatch, backing off"
                );
                tokio::select! {
                    _ = shutdown.changed() => {}
                    _ = tokio::time::sleep(backoff) => {}
                }
                continue;
            }
        }

        // Reap slots that already finished; their permits are long returned.
        while slots.try_join_next().is_some() {}

        tokio::select! {
            _ = shutdown.changed() => {}
            _ = tokio::time::sleep(poll) => {}
        }
    };

    match mode {
        StopMode::Graceful => {
            while slots.join_next().await.is_some() {}
        }
        StopMode::Forced => {
            slots.abort_all();
            while slots.join_next().await.is_some() {}
            release_in_flight(&queue, &in_flight).await;
        }
    }
    debug!(queue = %queue.name(), "dispatch loop stopped");
}

async fn dispatch_once(
    queue: &Arc<Queue>,
    semaphore: &Arc<Semaphore>,
    in_flight: &InFlight,
    slots: &mut JoinSet<()>,
) -> Result<(), StoreError> {
    promote_due(queue).await?;
    claim_ready(queue, semaphore, in_flight, slots).await?;
    Ok(())
}

/// Delayed -> Waiting for every job whose due time has passed.
async fn promote_due(queue: &Arc<Queue>) -> Result<(), StoreError> {
    let now = queue.clock().now();
    let delayed = queue
        .store()
        .list_by_states(queue.name(), &[JobState::Delayed])
        .await?;

    for job in delayed {
        if job.delay_until.is_some_and(|due| due > now) {
            continue;
        }
        let outcome = queue
            .store()
            .transition(
                job.id,
                JobState::Delayed,
                JobState::Waiting,
                Box::new(|r| r.promote()),
            )
            .await?;
        match outcome {
            TransitionOutcome::Applied(_) => {
                debug!(queue = %queue.name(), job = %job.id, "promoted to waiting");
            }
            // Another dispatcher got there first.
            TransitionOutcome::Conflict { .. } | TransitionOutcome::NotFound => {}
        }
    }
    Ok(())
}

/// Claim Waiting jobs oldest-first while worker slots are free.
async fn claim_ready(
    queue: &Arc<Queue>,
    semaphore: &Arc<Semaphore>,
    in_flight: &InFlight,
    slots: &mut JoinSet<()>,
) -> Result<(), StoreError> {
    loop {
        let Ok(permit) = Arc::clone(semaphore).try_acquire_owned() else {
            break;
        };

        let waiting = queue
            .store()
            .list_by_states(queue.name(), &[JobState::Waiting])
            .await?;

        let mut claimed = None;
        for candidate in waiting {
            let now = queue.clock().now();
            let outcome = queue
                .store()
                .transition(
                    candidate.id,
                    JobState::Waiting,
                    JobState::Active,
                    Box::new(move |r| r.begin_attempt(now)),
                )
                .await?;
            match outcome {
                TransitionOutcome::Applied(record) => {
                    claimed = Some(record);
                    break;
                }
                // Contention: someone else claimed it. Try the next oldest.
                TransitionOutcome::Conflict { .. } | TransitionOutcome::NotFound => {}
            }
        }

        let Some(record) = claimed else {
            drop(permit);
            break;
        };
        debug!(queue = %queue.name(), job = %record.id, attempt = record.attempts_made, "claimed");

        lock_in_flight(in_flight).insert(record.id);
        let queue = Arc::clone(queue);
        let in_flight = Arc::clone(in_flight);
        slots.spawn(run_slot(queue, record, in_flight, permit));
    }
    Ok(())
}

/// One worker slot: execute the processor, settle the outcome, free the slot.
async fn run_slot(
    queue: Arc<Queue>,
    record: JobRecord,
    in_flight: InFlight,
    _permit: OwnedSemaphorePermit,
) {
    let id = record.id;
    let result = execute(&queue, &record).await;
    if let Err(e) = settle(&queue, &record, result).await {
        warn!(queue = %queue.name(), job = %id, error = %e, "failed to record job outcome");
    }
    lock_in_flight(&in_flight).remove(&id);
}

/// Aborts the wrapped task when dropped. Without this, dropping the slot
/// future (forced stop, drain-timeout abort) would detach the invocation and
/// leave it running against a job already released back to Waiting.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run the processor with panic containment and the optional timeout.
async fn execute(queue: &Arc<Queue>, record: &JobRecord) -> Result<(), ProcessFailure> {
    let Some(processor) = queue.processor() else {
        return Err(ProcessFailure::new("processor unregistered mid-flight"));
    };

    // The invocation runs in its own task so a panicking processor surfaces
    // as a JoinError here instead of taking the slot down with it.
    let owned = record.clone();
    let mut invocation =
        AbortOnDrop(tokio::spawn(async move { processor.process_record(&owned).await }));

    let joined = match queue.settings().timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut invocation.0).await {
            Ok(joined) => joined,
            Err(_) => {
                return Err(ProcessFailure::new(format!(
                    "processor timed out after {limit:?}"
                )));
            }
        },
        None => (&mut invocation.0).await,
    };

    match joined {
        Ok(result) => result,
        Err(join_err) if join_err.is_panic() => Err(ProcessFailure::new("processor panicked")),
        Err(_) => Err(ProcessFailure::new("processor task cancelled")),
    }
}

/// Apply the post-execution transition for one finished invocation.
async fn settle(
    queue: &Arc<Queue>,
    record: &JobRecord,
    result: Result<(), ProcessFailure>,
) -> Result<(), StoreError> {
    let id = record.id;
    let now = queue.clock().now();

    match result {
        Ok(()) => {
            let outcome = queue
                .store()
                .transition(
                    id,
                    JobState::Active,
                    JobState::Completed,
                    Box::new(move |r| r.finish(now)),
                )
                .await?;
            if let TransitionOutcome::Applied(done) = outcome {
                debug!(queue = %queue.name(), job = %id, "completed");
                if done.remove_on_complete {
                    queue.store().purge(id).await?;
                    debug!(queue = %queue.name(), job = %id, "purged on completion");
                }
            }
        }
        Err(failure) => {
            let message = failure.to_string();
            // `record` is the post-claim snapshot, so attempts_made already
            // counts this execution.
            if record.attempts_made >= record.max_attempts {
                let outcome = queue
                    .store()
                    .transition(
                        id,
                        JobState::Active,
                        JobState::Failed,
                        Box::new(move |r| {
                            r.last_error = Some(message);
                            r.finished_at = Some(now);
                        }),
                    )
                    .await?;
                if outcome.is_applied() {
                    error!(
                        queue = %queue.name(),
                        job = %id,
                        attempts = record.attempts_made,
                        error = %failure,
                        "job failed terminally"
                    );
                }
            } else {
                match queue.settings().retry.next_delay(record.attempts_made) {
                    Some(delay) if !delay.is_zero() => {
                        let due = chrono::Duration::from_std(delay)
                            .ok()
                            .and_then(|d| now.checked_add_signed(d))
                            .unwrap_or(DateTime::<Utc>::MAX_UTC);
                        queue
                            .store()
                            .transition(
                                id,
                                JobState::Active,
                                JobState::Delayed,
                                Box::new(move |r| {
                                    r.last_error = Some(message);
                                    r.delay_until = Some(due);
                                }),
                            )
                            .await?;
                        debug!(
                            queue = %queue.name(),
                            job = %id,
                            attempt = record.attempts_made,
                            ?delay,
                            "retry scheduled with backoff"
                        );
                    }
                    _ => {
                        queue
                            .store()
                            .transition(
                                id,
                                JobState::Active,
                                JobState::Waiting,
                                Box::new(move |r| {
                                    r.last_error = Some(message);
                                    r.delay_until = None;
                                }),
                            )
                            .await?;
                        debug!(
                            queue = %queue.name(),
                            job = %id,
                            attempt = record.attempts_made,
                            "failed, immediately re-eligible"
                        );
                    }
                }
            }
        }
    }
    Ok(())
}

/// Put aborted in-flight jobs back to Waiting. Jobs that settled before the
/// abort landed come back as conflicts and are left alone.
async fn release_in_flight(queue: &Arc<Queue>, in_flight: &InFlight) {
    let ids: Vec<JobId> = lock_in_flight(in_flight).drain().collect();
    for id in ids {
        let outcome = queue
            .store()
            .transition(
                id,
                JobState::Active,
                JobState::Waiting,
                Box::new(|r| {
                    // The execution was aborted, not finished: uncount it.
                    r.attempts_made = r.attempts_made.saturating_sub(1);
                    r.processed_at = None;
                }),
            )
            .await;
        match outcome {
            Ok(TransitionOutcome::Applied(_)) => {
                debug!(queue = %queue.name(), job = %id, "released back to waiting");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(queue = %queue.name(), job = %id, error = %e, "failed to release job");
            }
        }
    }
}

fn lock_in_flight(in_flight: &InFlight) -> std::sync::MutexGuard<'_, HashSet<JobId>> {
    in_flight
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn store_backoff(failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(6);
    Duration::from_millis(100 << exponent).min(Duration::from_secs(5))
}
