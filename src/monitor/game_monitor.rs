use super::head::ChainHeadSource;
use crate::game::{ChainHead, Game, GameSource, GameWindow};
use crate::runtime::telemetry::Telemetry;
use crate::scheduler::{GameScheduler, SchedulerError};
use alloy::primitives::Address;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub struct MonitorParams {
    pub source: Arc<dyn GameSource>,
    pub heads: Arc<dyn ChainHeadSource>,
    pub scheduler: Arc<dyn GameScheduler>,
    pub game_window: Duration,
    pub allowlist: Vec<Address>,
    pub poll_interval: Duration,
    pub telemetry: Arc<Telemetry>,
}

pub struct GameMonitor {
    source: Arc<dyn GameSource>,
    heads: Arc<dyn ChainHeadSource>,
    scheduler: Arc<dyn GameScheduler>,
    game_window: Duration,
    allowlist: HashSet<Address>,
    poll_interval: Duration,
    telemetry: Arc<Telemetry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MonitorState {
    WaitingForBlock,
    Scheduling(ChainHead),
}

impl GameMonitor {
    pub fn new(params: MonitorParams) -> Self {
        Self {
            source: params.source,
            heads: params.heads,
            scheduler: params.scheduler,
            game_window: params.game_window,
            allowlist: params.allowlist.into_iter().collect(),
            poll_interval: params.poll_interval,
            telemetry: params.telemetry,
        }
    }

    /// Runs until `shutdown` is cancelled (returns `Ok`) or the scheduler stops
    /// accepting work (returns the error). Chain read failures are logged and
    /// retried on a later block.
    pub async fn run(&self, shutdown: &CancellationToken) -> Result<()> {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut last_block: Option<u64> = None;
        let mut state = MonitorState::WaitingForBlock;

        tracing::info!(
            window_secs = self.game_window.as_secs(),
            allowlisted = self.allowlist.len(),
            poll_ms = self.poll_interval.as_millis() as u64,
            "game monitor started"
        );

        loop {
            state = match state {
                MonitorState::WaitingForBlock => {
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        _ = ticker.tick() => {}
                    }
                    let head = tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        head = self.heads.latest_head() => head,
                    };
                    match head {
                        Ok(head) if last_block.map_or(true, |last| head.number > last) => {
                            last_block = Some(head.number);
                            MonitorState::Scheduling(head)
                        }
                        Ok(_) => MonitorState::WaitingForBlock,
                        Err(err) => {
                            self.telemetry.record_head_error();
                            tracing::warn!(error = format!("{err:#}"), "failed to fetch chain head");
                            MonitorState::WaitingForBlock
                        }
                    }
                }
                MonitorState::Scheduling(head) => {
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        result = self.progress_games(head, shutdown) => result?,
                    }
                    MonitorState::WaitingForBlock
                }
            };
        }

        tracing::info!("game monitor stopped");
        Ok(())
    }

    async fn progress_games(&self, head: ChainHead, shutdown: &CancellationToken) -> Result<()> {
        self.telemetry.record_tick();
        let window = GameWindow::new(head, self.game_window);

        let games = match self.source.fetch_games(&window).await {
            Ok(games) => games,
            Err(err) => {
                self.telemetry.record_load_error();
                tracing::warn!(block = head.number, error = %err, "failed to load games");
                return Ok(());
            }
        };

        let discovered = games.len();
        let games = filter_games(games, &window, &self.allowlist);
        tracing::debug!(
            block = head.number,
            discovered,
            scheduled = games.len(),
            "scheduling games"
        );

        match self.scheduler.schedule(games) {
            Ok(()) => Ok(()),
            Err(SchedulerError::Busy) => {
                tracing::info!(block = head.number, "scheduler busy; skipping block");
                Ok(())
            }
            // The scheduler shares the caller's token and may stop first.
            Err(SchedulerError::NotRunning) if shutdown.is_cancelled() => {
                tracing::debug!(block = head.number, "scheduler stopped during shutdown");
                Ok(())
            }
            Err(err @ SchedulerError::NotRunning) => {
                Err(err).context("scheduler stopped while monitoring games")
            }
        }
    }
}

/// Keeps games created inside `window` and, when `allowlist` is non-empty,
/// on it.
fn filter_games(games: Vec<Game>, window: &GameWindow, allowlist: &HashSet<Address>) -> Vec<Game> {
    games
        .into_iter()
        .filter(|game| window.contains(game.created_at))
        .filter(|game| {
            let allowed = allowlist.is_empty() || allowlist.contains(&game.address);
            if !allowed {
                tracing::trace!(game = %game.address, "skipping game not on allowlist");
            }
            allowed
        })
        .collect()
}
