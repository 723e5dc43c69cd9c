use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(5);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Counters and gauges describing the scheduler and monitor.
///
/// Shared by reference through the components that update it; recording never
/// blocks and never influences scheduling decisions.
#[derive(Default, Debug)]
pub struct Telemetry {
    up: AtomicBool,
    info: OnceLock<String>,
    ticks: AtomicU64,
    head_errors: AtomicU64,
    load_errors: AtomicU64,
    jobs_enqueued: AtomicU64,
    players_created: AtomicU64,
    player_create_failures: AtomicU64,
    progress_errors: AtomicU64,
    games_resolved: AtomicU64,
    games_released: AtomicU64,
    active_players: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl Telemetry {
    pub fn record_up(&self) {
        self.up.store(true, Ordering::Relaxed);
    }

    pub fn record_down(&self) {
        self.up.store(false, Ordering::Relaxed);
    }

    /// Stores build/version metadata. Only the first call is kept.
    pub fn record_info(&self, version: impl Into<String>) {
        let _ = self.info.set(version.into());
    }

    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_head_error(&self) {
        self.head_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load_error(&self) {
        self.load_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_jobs_enqueued(&self, count: usize) {
        if count == 0 {
            return;
        }
        self.jobs_enqueued
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_player_created(&self) {
        self.players_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_player_create_failure(&self) {
        self.player_create_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_progress_error(&self) {
        self.progress_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_game_resolved(&self) {
        self.games_resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_game_released(&self) {
        self.games_released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_active_players(&self, players: usize) {
        self.active_players.store(players, Ordering::Relaxed);
    }

    pub fn record_progress_started(&self) {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
    }

    pub fn record_progress_finished(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::Relaxed)
    }

    pub fn info(&self) -> Option<&str> {
        self.info.get().map(String::as_str)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously executing progress calls observed.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn active_players(&self) -> usize {
        self.active_players.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            head_errors: self.head_errors.load(Ordering::Relaxed),
            load_errors: self.load_errors.load(Ordering::Relaxed),
            jobs_enqueued: self.jobs_enqueued.load(Ordering::Relaxed),
            players_created: self.players_created.load(Ordering::Relaxed),
            player_create_failures: self.player_create_failures.load(Ordering::Relaxed),
            progress_errors: self.progress_errors.load(Ordering::Relaxed),
            games_resolved: self.games_resolved.load(Ordering::Relaxed),
            games_released: self.games_released.load(Ordering::Relaxed),
            active_players: self.active_players(),
            in_flight: self.in_flight(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub ticks: u64,
    pub head_errors: u64,
    pub load_errors: u64,
    pub jobs_enqueued: u64,
    pub players_created: u64,
    pub player_create_failures: u64,
    pub progress_errors: u64,
    pub games_resolved: u64,
    pub games_released: u64,
    pub active_players: usize,
    pub in_flight: usize,
}

/// Spawns a background task that periodically logs scheduling counters.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "faultmon::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current = telemetry.snapshot();
                    let jobs_delta = current.jobs_enqueued.saturating_sub(last_snapshot.jobs_enqueued);

                    tracing::info!(
                        target: "faultmon::metrics",
                        up = telemetry.is_up(),
                        ticks = current.ticks,
                        active_players = current.active_players,
                        in_flight = current.in_flight,
                        jobs_since_last = jobs_delta,
                        progress_errors = current.progress_errors,
                        player_create_failures = current.player_create_failures,
                        games_resolved = current.games_resolved,
                        games_released = current.games_released,
                        head_errors = current.head_errors,
                        load_errors = current.load_errors,
                        "runtime metrics snapshot"
                    );

                    last_snapshot = current;
                }
            }
        }
    })
}
