use crate::game::{GamePlayer, GameStatus};
use alloy::primitives::Address;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// The previous game set has not been picked up yet.
    #[error("scheduler is still busy with the previous update")]
    Busy,
    #[error("scheduler is not running")]
    NotRunning,
}

/// One progress step for one game, executed by a pool worker.
pub(crate) struct Job {
    pub(crate) address: Address,
    pub(crate) player: Arc<dyn GamePlayer>,
}

#[derive(Debug)]
pub(crate) enum ProgressOutcome {
    Completed(GameStatus),
    Failed(anyhow::Error),
    /// Still running when the shutdown grace period elapsed.
    Abandoned,
}

#[derive(Debug)]
pub(crate) struct JobResult {
    pub(crate) address: Address,
    pub(crate) outcome: ProgressOutcome,
}

pub(crate) type JobSender = mpsc::Sender<Job>;
pub(crate) type JobReceiver = mpsc::Receiver<Job>;
pub(crate) type ResultSender = mpsc::UnboundedSender<JobResult>;
pub(crate) type ResultReceiver = mpsc::UnboundedReceiver<JobResult>;
