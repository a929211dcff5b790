//! Typed processor seam.
//!
//! Producers and processors work with concrete payload types; the dispatcher
//! works with [`JobRecord`]s. [`TypedProcessor`] bridges the two by decoding
//! the stored payload and delegating, erased behind the object-safe
//! [`DynProcessor`] so the dispatch loop never learns the payload type.

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::{JobId, JobRecord};
use crate::error::ProcessFailure;

/// Anything serde can move through the store qualifies as a payload.
pub trait Payload: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T: Serialize + DeserializeOwned + Send + Sync + 'static> Payload for T {}

/// The view of a claimed job handed to a processor.
#[derive(Debug, Clone)]
pub struct ActiveJob<P> {
    pub id: JobId,
    pub queue_name: String,
    /// 1 on the first execution, counting up on retries.
    pub attempts_made: u32,
    pub payload: P,
}

/// One unit-of-work executor. Returning `Err` (or panicking, or timing out)
/// counts as a failed attempt; the queue's retry policy decides what happens
/// next.
#[async_trait]
pub trait Processor<P: Payload>: Send + Sync {
    async fn process(&self, job: ActiveJob<P>) -> Result<(), ProcessFailure>;
}

/// Object-safe face of a processor, as the dispatcher sees it.
#[async_trait]
pub trait DynProcessor: Send + Sync {
    async fn process_record(&self, record: &JobRecord) -> Result<(), ProcessFailure>;
}

/// Wraps a typed [`Processor`] into a [`DynProcessor`].
pub struct TypedProcessor<P, H> {
    handler: H,
    _marker: PhantomData<fn(P)>,
}

impl<P: Payload, H: Processor<P>> TypedProcessor<P, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<P: Payload, H: Processor<P>> DynProcessor for TypedProcessor<P, H> {
    async fn process_record(&self, record: &JobRecord) -> Result<(), ProcessFailure> {
        let payload: P = serde_json::from_value(record.payload.clone())
            .map_err(|e| ProcessFailure::new(format!("payload decode: {e}")))?;
        let job = ActiveJob {
            id: record.id,
            queue_name: record.queue_name.clone(),
            attempts_made: record.attempts_made,
            payload,
        };
        self.handler.process(job).await
    }
}
