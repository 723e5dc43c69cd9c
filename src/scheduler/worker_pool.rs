//! Bounded pool of tasks that execute progress jobs.
//!
//! Workers pull from a shared job channel, so at most `max_workers` progress
//! calls run at once. A panicking or failing player only affects its own job.

use super::types::{Job, JobReceiver, JobResult, ProgressOutcome, ResultSender};
use crate::runtime::telemetry::Telemetry;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub(crate) struct WorkerPoolParams {
    pub max_workers: usize,
    pub grace_period: Duration,
    pub telemetry: Arc<Telemetry>,
}

pub(crate) struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub(crate) fn launch(
        params: WorkerPoolParams,
        jobs: JobReceiver,
        results: ResultSender,
        run_token: CancellationToken,
    ) -> Self {
        let max_workers = params.max_workers.max(1);
        let jobs = Arc::new(Mutex::new(jobs));

        let workers = (0..max_workers)
            .map(|worker_id| {
                let worker = Worker {
                    id: worker_id,
                    jobs: jobs.clone(),
                    results: results.clone(),
                    run_token: run_token.clone(),
                    grace_period: params.grace_period,
                    telemetry: params.telemetry.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        Self { workers }
    }

    /// Waits for every worker to exit. Workers stop once the run token is
    /// cancelled and their current job has returned or been abandoned.
    pub(crate) async fn join(self) {
        for (worker_id, handle) in self.workers.into_iter().enumerate() {
            if let Err(err) = handle.await {
                tracing::error!(worker = worker_id, error = %err, "worker task failed");
            }
        }
    }
}

struct Worker {
    id: usize,
    jobs: Arc<Mutex<JobReceiver>>,
    results: ResultSender,
    run_token: CancellationToken,
    grace_period: Duration,
    telemetry: Arc<Telemetry>,
}

impl Worker {
    async fn run(self) {
        loop {
            let next = {
                let mut jobs = self.jobs.lock().await;
                tokio::select! {
                    biased;
                    _ = self.run_token.cancelled() => None,
                    job = jobs.recv() => job,
                }
            };
            let Some(job) = next else {
                break;
            };
            // Queued jobs are dropped once shutdown begins.
            if self.run_token.is_cancelled() {
                break;
            }

            let address = job.address;
            let outcome = self.execute(job).await;
            if self.results.send(JobResult { address, outcome }).is_err() {
                tracing::debug!(worker = self.id, game = %address, "result channel closed");
                break;
            }
        }
        tracing::debug!(worker = self.id, "worker stopped");
    }

    async fn execute(&self, job: Job) -> ProgressOutcome {
        self.telemetry.record_progress_started();

        let progress = AssertUnwindSafe(job.player.progress_game(&self.run_token)).catch_unwind();
        tokio::pin!(progress);

        let result = tokio::select! {
            biased;
            result = &mut progress => Some(result),
            _ = self.run_token.cancelled() => {
                match tokio::time::timeout(self.grace_period, &mut progress).await {
                    Ok(result) => Some(result),
                    Err(_) => None,
                }
            }
        };

        self.telemetry.record_progress_finished();

        match result {
            Some(Ok(Ok(status))) => ProgressOutcome::Completed(status),
            Some(Ok(Err(err))) => ProgressOutcome::Failed(err),
            Some(Err(panic_payload)) => {
                let panic_msg = panic_message(panic_payload.as_ref());
                tracing::error!(
                    worker = self.id,
                    game = %job.address,
                    panic = %panic_msg,
                    "game player panicked"
                );
                ProgressOutcome::Failed(anyhow::anyhow!("game player panicked: {panic_msg}"))
            }
            None => {
                tracing::warn!(
                    worker = self.id,
                    game = %job.address,
                    grace_ms = self.grace_period.as_millis() as u64,
                    "abandoning progress call that ignored cancellation"
                );
                ProgressOutcome::Abandoned
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
