//! Assembles the loader, prestate check, scheduler and monitor into one
//! service and exposes the long-running `monitor_game` entry point.

use crate::game::{
    validate_absolute_prestate, GameLoader, GameSource, PlayerFactory, PrestateSource,
    TraceProvider,
};
use crate::monitor::{ChainHeadSource, GameMonitor, MonitorParams};
use crate::rpc::EthRpcClient;
use crate::runtime::config::ChallengerConfig;
use crate::runtime::telemetry::{spawn_metrics_reporter, Telemetry};
use crate::scheduler::{DiskManager, Scheduler, SchedulerParams};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Pre-built collaborators for [`Service::from_parts`].
pub struct ServiceParts {
    pub config: ChallengerConfig,
    pub games: Arc<dyn GameSource>,
    pub prestate: Arc<dyn PrestateSource>,
    pub heads: Arc<dyn ChainHeadSource>,
    pub trace: Arc<dyn TraceProvider>,
    pub factory: Arc<dyn PlayerFactory>,
    pub telemetry: Arc<Telemetry>,
}

pub struct Service {
    config: ChallengerConfig,
    scheduler: Arc<Scheduler>,
    monitor: GameMonitor,
    telemetry: Arc<Telemetry>,
}

impl Service {
    /// Dials the L1 node, binds the factory contract and validates the
    /// absolute prestate. Any failure here is fatal.
    pub async fn connect(
        config: ChallengerConfig,
        trace: Arc<dyn TraceProvider>,
        factory: Arc<dyn PlayerFactory>,
    ) -> Result<Self> {
        let rpc = Arc::new(EthRpcClient::from_config(&config).context("failed to dial L1")?);
        let chain_id = rpc
            .chain_id()
            .await
            .with_context(|| format!("failed to dial L1 at {}", rpc.endpoint()))?;
        tracing::info!(chain_id, endpoint = rpc.endpoint(), "connected to L1");

        let loader = Arc::new(GameLoader::new(
            rpc.clone(),
            config.game_factory_address(),
            config.game_type(),
        ));

        Self::from_parts(ServiceParts {
            config,
            games: loader.clone(),
            prestate: loader,
            heads: rpc,
            trace,
            factory,
            telemetry: Arc::new(Telemetry::default()),
        })
        .await
    }

    pub async fn from_parts(parts: ServiceParts) -> Result<Self> {
        let ServiceParts {
            config,
            games,
            prestate,
            heads,
            trace,
            factory,
            telemetry,
        } = parts;
        config.validate()?;

        validate_absolute_prestate(trace.as_ref(), prestate.as_ref())
            .await
            .context("failed to validate absolute prestate")?;

        let disk = Arc::new(DiskManager::new(config.datadir()));
        let scheduler = Arc::new(Scheduler::new(SchedulerParams {
            disk,
            factory,
            max_concurrency: config.max_concurrency(),
            grace_period: config.progress_grace_period(),
            telemetry: telemetry.clone(),
        }));
        let monitor = GameMonitor::new(MonitorParams {
            source: games,
            heads,
            scheduler: scheduler.clone(),
            game_window: config.game_window(),
            allowlist: config.game_allowlist().to_vec(),
            poll_interval: config.poll_interval(),
            telemetry: telemetry.clone(),
        });

        telemetry.record_info(env!("CARGO_PKG_VERSION"));
        Ok(Self {
            config,
            scheduler,
            monitor,
            telemetry,
        })
    }

    pub fn config(&self) -> &ChallengerConfig {
        &self.config
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    /// Starts the scheduler and runs the monitor until `shutdown` is cancelled
    /// or the monitor fails. The scheduler is closed on every exit path.
    pub async fn monitor_game(&self, shutdown: &CancellationToken) -> Result<()> {
        let run_token = shutdown.child_token();
        self.scheduler.start(&run_token);
        let reporter = spawn_metrics_reporter(
            self.telemetry.clone(),
            run_token.clone(),
            self.config.metrics_interval(),
        );
        self.telemetry.record_up();

        let result = self.monitor.run(&run_token).await;

        self.telemetry.record_down();
        self.scheduler.close().await;
        run_token.cancel();
        if let Err(err) = reporter.await {
            tracing::warn!(error = %err, "metrics reporter task failed");
        }

        if let Err(err) = &result {
            tracing::error!(error = format!("{err:#}"), "game monitor failed");
        }
        result
    }
}
