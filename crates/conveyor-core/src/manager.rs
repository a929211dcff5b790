//! Queue manager: the registry of queues for one running system.
//!
//! Explicitly constructed and passed by reference; there is no global
//! instance. The manager owns its queues and every processing handle it
//! spawned, so tearing it down drains everything it started.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use crate::dispatch::{ProcessingHandle, StopMode};
use crate::domain::{JobCounts, JobId, JobOptions, JobRecord, JobState};
use crate::error::QueueError;
use crate::queue::Queue;

#[derive(Default)]
pub struct QueueManager {
    queues: RwLock<HashMap<String, Arc<Queue>>>,
    handles: tokio::sync::Mutex<Vec<ProcessingHandle>>,
}

impl QueueManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a queue under its name. Duplicate names are a configuration
    /// error; the earlier registration stays in place.
    pub fn register_queue(&self, queue: Arc<Queue>) -> Result<(), QueueError> {
        let mut queues = self
            .queues
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if queues.contains_key(queue.name()) {
            return Err(QueueError::DuplicateQueue(queue.name().to_string()));
        }
        info!(queue = %queue.name(), "queue registered");
        queues.insert(queue.name().to_string(), queue);
        Ok(())
    }

    pub fn get_queue(&self, name: &str) -> Option<Arc<Queue>> {
        self.queues
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn queue(&self, name: &str) -> Result<Arc<Queue>, QueueError> {
        self.get_queue(name)
            .ok_or_else(|| QueueError::QueueNotFound(name.to_string()))
    }

    pub async fn add_job(
        &self,
        name: &str,
        payload: serde_json::Value,
        options: JobOptions,
    ) -> Result<JobId, QueueError> {
        self.queue(name)?.add_job(payload, options).await
    }

    pub async fn get_job(&self, name: &str, id: JobId) -> Result<Option<JobRecord>, QueueError> {
        self.queue(name)?.get_job(id).await
    }

    pub async fn get_jobs(
        &self,
        name: &str,
        states: &[JobState],
    ) -> Result<Vec<JobRecord>, QueueError> {
        self.queue(name)?.get_jobs(states).await
    }

    pub async fn get_job_counts(&self, name: &str) -> Result<JobCounts, QueueError> {
        self.queue(name)?.get_job_counts().await
    }

    /// Start one queue's dispatch loop and keep its handle for shutdown.
    pub async fn process_queue(&self, name: &str, concurrency: usize) -> Result<(), QueueError> {
        let handle = self.queue(name)?.start_processing(concurrency)?;
        self.handles.lock().await.push(handle);
        Ok(())
    }

    /// Start dispatch loops for every registered queue. A queue that cannot
    /// start (no processor) is logged and skipped; the rest still run.
    pub async fn process_all_queues(&self, concurrency: usize) {
        let queues: Vec<Arc<Queue>> = {
            let map = self
                .queues
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            map.values().cloned().collect()
        };

        for queue in queues {
            match queue.start_processing(concurrency) {
                Ok(handle) => self.handles.lock().await.push(handle),
                Err(e) => {
                    warn!(queue = %queue.name(), error = %e, "queue not started");
                }
            }
        }
    }

    /// Stop every dispatch loop this manager started.
    pub async fn shutdown(&self, mode: StopMode) {
        let handles: Vec<ProcessingHandle> = {
            let mut held = self.handles.lock().await;
            held.drain(..).collect()
        };
        for handle in handles {
            handle.stop(mode).await;
        }
    }
}
