//! Queue: a named, typed channel of jobs.
//!
//! A queue binds a name to one payload schema and (optionally) one processor.
//! It validates and persists on enqueue and answers read queries; all job
//! state lives in the store, never here.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{debug, warn};

use crate::clock::Clock;
use crate::dispatch::{self, ProcessingHandle};
use crate::domain::{IdGenerator, JobCounts, JobId, JobOptions, JobRecord, JobState};
use crate::error::QueueError;
use crate::processor::{DynProcessor, Payload, Processor, TypedProcessor};
use crate::retry::RetryPolicy;
use crate::store::JobStore;

/// Per-queue dispatch knobs.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Backoff between failed attempts. Default: immediate re-eligibility.
    pub retry: RetryPolicy,

    /// Upper bound on one processor invocation. The default `None` means
    /// unbounded: a processor that never returns occupies its worker slot
    /// forever, so bound this in anything long-running.
    pub timeout: Option<Duration>,

    /// Dispatch tick. Also bounds how long a due Delayed job can sit before
    /// promotion to Waiting.
    pub poll_interval: Duration,

    /// How long a graceful stop waits for in-flight jobs before aborting
    /// them.
    pub drain_timeout: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::Immediate,
            timeout: None,
            poll_interval: Duration::from_millis(20),
            drain_timeout: Duration::from_secs(5),
        }
    }
}

type Validator = Arc<dyn Fn(&serde_json::Value) -> Result<(), String> + Send + Sync>;

pub struct Queue {
    name: String,
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    settings: QueueSettings,
    validator: Validator,
    processor: RwLock<Option<Arc<dyn DynProcessor>>>,
}

impl Queue {
    /// Create a queue whose payloads must decode as `P`.
    pub fn new<P: Payload>(
        name: impl Into<String>,
        store: Arc<dyn JobStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        settings: QueueSettings,
    ) -> Arc<Self> {
        let validator: Validator = Arc::new(|value| {
            serde_json::from_value::<P>(value.clone())
                .map(|_| ())
                .map_err(|e| e.to_string())
        });
        Arc::new(Self {
            name: name.into(),
            store,
            clock,
            ids,
            settings,
            validator,
            processor: RwLock::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    pub(crate) fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub(crate) fn processor(&self) -> Option<Arc<dyn DynProcessor>> {
        self.processor
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Validate and persist one job. Returns the id as soon as the record is
    /// durable; nothing is processed synchronously.
    pub async fn add_job(
        &self,
        payload: serde_json::Value,
        options: JobOptions,
    ) -> Result<JobId, QueueError> {
        (self.validator)(&payload).map_err(|reason| QueueError::Validation {
            queue: self.name.clone(),
            reason,
        })?;

        let record = JobRecord::new(
            self.ids.next_job_id(),
            &self.name,
            payload,
            &options,
            self.clock.now(),
        );
        let id = record.id;
        let state = record.state;
        self.store.create(record).await?;
        debug!(queue = %self.name, job = %id, ?state, "job enqueued");
        Ok(id)
    }

    /// Typed convenience over [`Queue::add_job`].
    pub async fn add<P: Payload>(
        &self,
        payload: &P,
        options: JobOptions,
    ) -> Result<JobId, QueueError> {
        let value = serde_json::to_value(payload).map_err(|e| QueueError::Validation {
            queue: self.name.clone(),
            reason: e.to_string(),
        })?;
        self.add_job(value, options).await
    }

    /// Install the processor for this queue. Last write wins: installing over
    /// an existing processor replaces it and is logged, not ignored.
    pub fn register_processor<P: Payload, H: Processor<P> + 'static>(&self, handler: H) -> &Self {
        let mut slot = self
            .processor
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if slot.is_some() {
            warn!(queue = %self.name, "replacing registered processor");
        }
        *slot = Some(Arc::new(TypedProcessor::new(handler)));
        self
    }

    /// Look up one of this queue's jobs. Ids belonging to another queue on a
    /// shared store come back as `None`.
    pub async fn get_job(&self, id: JobId) -> Result<Option<JobRecord>, QueueError> {
        let record = self.store.get(id).await?;
        Ok(record.filter(|r| r.queue_name == self.name))
    }

    pub async fn get_jobs(&self, states: &[JobState]) -> Result<Vec<JobRecord>, QueueError> {
        Ok(self.store.list_by_states(&self.name, states).await?)
    }

    pub async fn get_job_counts(&self) -> Result<JobCounts, QueueError> {
        Ok(self.store.counts(&self.name).await?)
    }

    /// Start the dispatch loop for this queue with up to `concurrency`
    /// concurrent processor invocations. Fails without spawning anything if
    /// no processor is registered.
    pub fn start_processing(
        self: &Arc<Self>,
        concurrency: usize,
    ) -> Result<ProcessingHandle, QueueError> {
        if self.processor().is_none() {
            return Err(QueueError::NoProcessorRegistered(self.name.clone()));
        }
        Ok(dispatch::spawn(Arc::clone(self), concurrency))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::UlidGenerator;
    use crate::error::ProcessFailure;
    use crate::processor::ActiveJob;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde::{Deserialize, Serialize};
    use std::sync::Mutex;

    #[derive(Debug, Serialize, Deserialize)]
    struct Order {
        item: String,
        quantity: u32,
    }

    struct TaggingProcessor {
        tag: &'static str,
        seen: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Processor<Order> for TaggingProcessor {
        async fn process(&self, _job: ActiveJob<Order>) -> Result<(), ProcessFailure> {
            self.seen
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(self.tag);
            Ok(())
        }
    }

    fn test_queue(name: &str) -> Arc<Queue> {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        ));
        let ids = Arc::new(UlidGenerator::new(Arc::clone(&clock) as Arc<dyn Clock>));
        Queue::new::<Order>(
            name,
            Arc::new(MemoryStore::new()),
            clock,
            ids,
            QueueSettings::default(),
        )
    }

    #[tokio::test]
    async fn add_job_persists_and_returns_id() {
        let queue = test_queue("orders");
        let id = queue
            .add_job(
                serde_json::json!({"item": "widget", "quantity": 2}),
                JobOptions::default(),
            )
            .await
            .unwrap();

        let record = queue.get_job(id).await.unwrap().unwrap();
        assert_eq!(record.state, JobState::Waiting);
        assert_eq!(record.queue_name, "orders");
    }

    #[tokio::test]
    async fn bad_payload_is_rejected_before_any_write() {
        let queue = test_queue("orders");
        let err = queue
            .add_job(serde_json::json!({"item": "widget"}), JobOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, QueueError::Validation { .. }));
        let counts = queue.get_job_counts().await.unwrap();
        assert_eq!(counts.total(), 0);
    }

    #[tokio::test]
    async fn typed_add_goes_through_the_same_validation() {
        let queue = test_queue("orders");
        let id = queue
            .add(
                &Order {
                    item: "widget".into(),
                    quantity: 1,
                },
                JobOptions::default(),
            )
            .await
            .unwrap();
        assert!(queue.get_job(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delayed_job_starts_in_delayed_state() {
        let queue = test_queue("orders");
        let id = queue
            .add_job(
                serde_json::json!({"item": "widget", "quantity": 1}),
                JobOptions::default().with_delay(Duration::from_secs(5)),
            )
            .await
            .unwrap();

        let record = queue.get_job(id).await.unwrap().unwrap();
        assert_eq!(record.state, JobState::Delayed);
        assert!(record.delay_until.is_some());
    }

    #[tokio::test]
    async fn reads_return_empty_rather_than_erroring() {
        let queue = test_queue("orders");
        assert!(queue.get_jobs(&[JobState::Waiting]).await.unwrap().is_empty());
        assert!(
            queue
                .get_job(JobId::from_ulid(ulid::Ulid::new()))
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(queue.get_job_counts().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn get_job_is_scoped_to_this_queue() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        ));
        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(Arc::clone(&clock)));
        let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());

        let orders = Queue::new::<Order>(
            "orders",
            Arc::clone(&store),
            Arc::clone(&clock),
            Arc::clone(&ids),
            QueueSettings::default(),
        );
        let refunds = Queue::new::<Order>("refunds", store, clock, ids, QueueSettings::default());

        let id = orders
            .add_job(
                serde_json::json!({"item": "widget", "quantity": 1}),
                JobOptions::default(),
            )
            .await
            .unwrap();

        assert!(orders.get_job(id).await.unwrap().is_some());
        assert!(refunds.get_job(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn start_processing_requires_a_processor() {
        let queue = test_queue("orders");
        let err = queue.start_processing(4).unwrap_err();
        assert!(matches!(err, QueueError::NoProcessorRegistered(name) if name == "orders"));
    }

    #[tokio::test]
    async fn registering_twice_keeps_the_last_processor() {
        let queue = test_queue("orders");
        let seen = Arc::new(Mutex::new(Vec::new()));
        queue.register_processor(TaggingProcessor {
            tag: "first",
            seen: Arc::clone(&seen),
        });
        queue.register_processor(TaggingProcessor {
            tag: "second",
            seen: Arc::clone(&seen),
        });

        let id = queue
            .add_job(
                serde_json::json!({"item": "widget", "quantity": 1}),
                JobOptions::default(),
            )
            .await
            .unwrap();
        let record = queue.get_job(id).await.unwrap().unwrap();
        queue
            .processor()
            .unwrap()
            .process_record(&record)
            .await
            .unwrap();

        let seen = seen.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        assert_eq!(*seen, vec!["second"]);
    }
}
