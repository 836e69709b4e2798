//! Broker queue consumer with a bounded concurrency ceiling
//!
//! The consumer is an explicit polling loop over the durable job queue. A
//! semaphore permit is acquired before a job is pulled, so once the ceiling
//! of in-flight pipelines is reached the loop simply stops polling; that is
//! the system's backpressure mechanism. A job is acknowledged only after its
//! pipeline reaches a terminal state; `failed` is acknowledged too, since it
//! records a definitive outcome. Messages that cannot be deserialized are
//! negatively acknowledged and dead-lettered once the delivery budget is
//! spent.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::time::sleep;

use crate::config::WorkerConfig;
use crate::storage::{ClaimedJob, Database};
use crate::types::QueryJob;

use super::pipeline::QueryPipeline;

/// Pulls query jobs from the durable queue and runs them through the pipeline
pub struct QueryConsumer {
    database: Arc<Database>,
    pipeline: Arc<QueryPipeline>,
    config: WorkerConfig,
}

impl QueryConsumer {
    pub fn new(database: Arc<Database>, pipeline: Arc<QueryPipeline>, config: &WorkerConfig) -> Self {
        Self { database, pipeline, config: config.clone() }
    }

    /// Run the polling loop until `shutdown` fires, then drain in-flight
    /// pipelines before returning
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "consumer started: concurrency ceiling {}, poll interval {}ms, delivery budget {}",
            self.config.concurrency,
            self.config.poll_interval_ms,
            self.config.max_delivery_attempts
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            // A permit is held before a job is pulled; when the ceiling is
            // reached the loop blocks here instead of over-fetching.
            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown.changed() => break,
            };

            match self.database.claim_next_job() {
                Ok(Some(claimed)) => {
                    let database = self.database.clone();
                    let pipeline = self.pipeline.clone();
                    let max_attempts = self.config.max_delivery_attempts;
                    tokio::spawn(async move {
                        Self::handle_job(database, pipeline, claimed, max_attempts).await;
                        drop(permit);
                    });
                }
                Ok(None) => {
                    drop(permit);
                    tokio::select! {
                        _ = sleep(poll_interval) => {}
                        _ = shutdown.changed() => break,
                    }
                }
                Err(e) => {
                    drop(permit);
                    tracing::error!("failed to poll the job queue: {e}");
                    tokio::select! {
                        _ = sleep(poll_interval) => {}
                        _ = shutdown.changed() => break,
                    }
                }
            }
        }

        tracing::info!("consumer stopping, draining in-flight queries");
        let _ = semaphore.acquire_many(self.config.concurrency as u32).await;
        tracing::info!("consumer stopped");
    }

    async fn handle_job(
        database: Arc<Database>,
        pipeline: Arc<QueryPipeline>,
        claimed: ClaimedJob,
        max_attempts: u32,
    ) {
        let job: QueryJob = match serde_json::from_str(&claimed.payload) {
            Ok(job) => job,
            Err(e) => {
                tracing::warn!(
                    "job {} has a malformed envelope (delivery attempt {}): {e}",
                    claimed.id,
                    claimed.attempts
                );
                Self::nack(&database, claimed.id, &format!("malformed envelope: {e}"), max_attempts);
                return;
            }
        };

        let query_id = job.query_id;
        let run = AssertUnwindSafe(pipeline.process(&job)).catch_unwind().await;
        match run {
            Ok(Ok(outcome)) => {
                // Terminal outcome recorded; failed queries are acknowledged
                // deliberately so the broker does not redeliver them.
                if let Err(e) = database.ack_job(claimed.id) {
                    tracing::error!("failed to acknowledge job {}: {e}", claimed.id);
                    return;
                }
                tracing::debug!(
                    "job {} for query {query_id} acknowledged ({})",
                    claimed.id,
                    outcome.as_str()
                );
            }
            Ok(Err(e)) => {
                tracing::error!("pipeline could not record state for query {query_id}: {e}");
                Self::nack(&database, claimed.id, &e.to_string(), max_attempts);
            }
            Err(_) => {
                tracing::error!("pipeline panicked while processing query {query_id}");
                Self::nack(&database, claimed.id, "pipeline panicked", max_attempts);
            }
        }
    }

    fn nack(database: &Database, job_id: i64, error: &str, max_attempts: u32) {
        match database.nack_job(job_id, error, max_attempts) {
            Ok(true) => {
                tracing::error!("job {job_id} dead-lettered after exhausting its delivery budget")
            }
            Ok(false) => tracing::debug!("job {job_id} returned to the queue for redelivery"),
            Err(e) => tracing::error!("failed to negatively acknowledge job {job_id}: {e}"),
        }
    }
}
