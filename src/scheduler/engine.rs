use super::coordinator::Coordinator;
use super::disk::DiskManager;
use super::types::{JobReceiver, JobSender, ResultReceiver, SchedulerError};
use super::worker_pool::{WorkerPool, WorkerPoolParams};
use crate::game::{Game, PlayerFactory};
use crate::runtime::telemetry::Telemetry;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Accepts the set of games that should be progressed on the next tick.
pub trait GameScheduler: Send + Sync {
    /// Non-blocking hand-off. Fails with [`SchedulerError::Busy`] while the
    /// previous update is still pending.
    fn schedule(&self, games: Vec<Game>) -> Result<(), SchedulerError>;
}

pub struct SchedulerParams {
    pub disk: Arc<DiskManager>,
    pub factory: Arc<dyn PlayerFactory>,
    pub max_concurrency: usize,
    pub grace_period: Duration,
    pub telemetry: Arc<Telemetry>,
}

/// Maintains one player per in-scope game and progresses them on a bounded
/// worker pool.
pub struct Scheduler {
    disk: Arc<DiskManager>,
    factory: Arc<dyn PlayerFactory>,
    max_concurrency: usize,
    grace_period: Duration,
    telemetry: Arc<Telemetry>,
    state: Mutex<Option<RunningScheduler>>,
}

struct RunningScheduler {
    run_token: CancellationToken,
    schedule_tx: mpsc::Sender<Vec<Game>>,
    coordinator: JoinHandle<()>,
    pool: WorkerPool,
}

impl Scheduler {
    pub fn new(params: SchedulerParams) -> Self {
        Self {
            disk: params.disk,
            factory: params.factory,
            max_concurrency: params.max_concurrency.max(1),
            grace_period: params.grace_period,
            telemetry: params.telemetry,
            state: Mutex::new(None),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn is_running(&self) -> bool {
        self.lock_state()
            .as_ref()
            .is_some_and(|running| !running.run_token.is_cancelled())
    }

    /// Spawns the coordinator and worker tasks. They stop when `shutdown` is
    /// cancelled or [`Scheduler::close`] is called. Starting a running
    /// scheduler is a no-op.
    pub fn start(&self, shutdown: &CancellationToken) {
        let mut state = self.lock_state();
        if state.is_some() {
            tracing::debug!("scheduler already started");
            return;
        }

        let run_token = shutdown.child_token();
        let (schedule_tx, schedule_rx) = mpsc::channel(1);
        let (job_tx, job_rx): (JobSender, JobReceiver) = mpsc::channel(self.max_concurrency);
        let (result_tx, result_rx) = mpsc::unbounded_channel();

        let pool = WorkerPool::launch(
            WorkerPoolParams {
                max_workers: self.max_concurrency,
                grace_period: self.grace_period,
                telemetry: self.telemetry.clone(),
            },
            job_rx,
            result_tx,
            run_token.clone(),
        );

        let coordinator = Coordinator::new(
            self.disk.clone(),
            self.factory.clone(),
            self.telemetry.clone(),
        );
        let coordinator = tokio::spawn(run_coordinator(
            coordinator,
            schedule_rx,
            job_tx,
            result_rx,
            run_token.clone(),
        ));

        tracing::info!(
            max_concurrency = self.max_concurrency,
            datadir = %self.disk.datadir().display(),
            "scheduler started"
        );
        *state = Some(RunningScheduler {
            run_token,
            schedule_tx,
            coordinator,
            pool,
        });
    }

    pub fn schedule(&self, games: Vec<Game>) -> Result<(), SchedulerError> {
        let state = self.lock_state();
        let Some(running) = state.as_ref() else {
            return Err(SchedulerError::NotRunning);
        };
        if running.run_token.is_cancelled() {
            return Err(SchedulerError::NotRunning);
        }

        running
            .schedule_tx
            .try_send(games)
            .map_err(|err| match err {
                TrySendError::Full(_) => SchedulerError::Busy,
                TrySendError::Closed(_) => SchedulerError::NotRunning,
            })
    }

    /// Stops accepting updates, cancels in-flight progress calls and waits for
    /// every task to exit. Calls that ignore cancellation are abandoned after
    /// the grace period. Closing an idle scheduler is a no-op.
    pub async fn close(&self) {
        let running = self.lock_state().take();
        let Some(running) = running else {
            return;
        };

        running.run_token.cancel();
        drop(running.schedule_tx);

        if let Err(err) = running.coordinator.await {
            tracing::error!(error = %err, "scheduler coordinator task failed");
        }
        running.pool.join().await;
        tracing::info!("scheduler closed");
    }

    fn lock_state(&self) -> MutexGuard<'_, Option<RunningScheduler>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl GameScheduler for Scheduler {
    fn schedule(&self, games: Vec<Game>) -> Result<(), SchedulerError> {
        Scheduler::schedule(self, games)
    }
}

async fn run_coordinator(
    mut coordinator: Coordinator,
    mut schedule_rx: mpsc::Receiver<Vec<Game>>,
    job_tx: JobSender,
    mut result_rx: ResultReceiver,
    run_token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = run_token.cancelled() => break,
            Some(result) = result_rx.recv() => coordinator.process_result(result),
            games = schedule_rx.recv() => {
                let Some(games) = games else {
                    break;
                };
                let jobs = coordinator.schedule(&games);
                let mut delivered = true;
                for job in jobs {
                    tokio::select! {
                        biased;
                        _ = run_token.cancelled() => {
                            delivered = false;
                            break;
                        }
                        sent = job_tx.send(job) => {
                            if sent.is_err() {
                                delivered = false;
                                break;
                            }
                        }
                    }
                }
                if !delivered {
                    break;
                }
            }
        }
    }

    // Workers finish or abandon their current call within the grace period,
    // then drop their result senders.
    drop(job_tx);
    while let Some(result) = result_rx.recv().await {
        coordinator.process_result(result);
    }

    coordinator.shutdown();
    tracing::debug!("scheduler coordinator stopped");
}
