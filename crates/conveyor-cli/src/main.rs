//! Demo: one queue, a slow processor, and a bulk submission with alternating
//! delays. Watch the counts drain with `RUST_LOG=info`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::info;
use tracing_subscriber::EnvFilter;

use conveyor_core::{
    ActiveJob, Clock, IdGenerator, JobOptions, JobStore, MemoryStore, ProcessFailure, Processor,
    Queue, QueueManager, QueueSettings, StopMode, SystemClock, UlidGenerator, submit_batch,
};

#[derive(Debug, Serialize, Deserialize)]
struct BurgerOrder {
    name: String,
    kind: String,
}

struct GrillProcessor;

#[async_trait]
impl Processor<BurgerOrder> for GrillProcessor {
    async fn process(&self, job: ActiveJob<BurgerOrder>) -> Result<(), ProcessFailure> {
        info!(job = %job.id, attempt = job.attempts_made, order = %job.payload.name, "grilling");
        sleep(Duration::from_millis(100)).await;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(Arc::clone(&clock)));

    let manager = QueueManager::new();
    let queue = Queue::new::<BurgerOrder>(
        "burger",
        store,
        clock,
        ids,
        QueueSettings::default(),
    );
    queue.register_processor(GrillProcessor);
    manager.register_queue(Arc::clone(&queue))?;
    manager.process_all_queues(10).await;

    // 200 orders, every other one held back for five seconds.
    let mut items = Vec::new();
    for index in 0..200u32 {
        let order = BurgerOrder {
            name: format!("burger-{index}"),
            kind: "meat".into(),
        };
        let delay = if index % 2 == 0 {
            Duration::from_secs(5)
        } else {
            Duration::ZERO
        };
        items.push((
            serde_json::to_value(&order)?,
            JobOptions::default()
                .with_delay(delay)
                .with_max_attempts(3)
                .with_remove_on_complete(true),
        ));
    }

    let results = submit_batch(&queue, items, 32).await;
    let rejected = results.iter().filter(|r| r.is_err()).count();
    info!(submitted = results.len() - rejected, rejected, "batch submitted");

    // Completed orders purge themselves, so the queue is done when empty.
    loop {
        let counts = queue.get_job_counts().await?;
        info!(?counts, "queue status");
        if counts.total() == 0 {
            break;
        }
        sleep(Duration::from_millis(500)).await;
    }

    manager.shutdown(StopMode::Graceful).await;
    info!("all orders served");
    Ok(())
}
