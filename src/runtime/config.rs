use crate::runtime::telemetry;
use alloy::primitives::Address;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_GAME_TYPE: u32 = 0;
const DEFAULT_MAX_CONCURRENCY: usize = 4;
const DEFAULT_GAME_WINDOW_SECS: u64 = 28 * 24 * 60 * 60;
const DEFAULT_POLL_INTERVAL_MS: u64 = 300;
const DEFAULT_RPC_TIMEOUT_SECS: u64 = 10;
const DEFAULT_PROGRESS_GRACE_PERIOD_SECS: u64 = 10;

/// Runtime configuration for the challenger service.
///
/// All instances must be constructed via [`ChallengerConfig::builder`] or
/// [`ChallengerConfig::new`] so invariants are validated before any consumer
/// observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengerConfig {
    l1_rpc_url: String,
    game_factory_address: Address,
    game_type: u32,
    datadir: PathBuf,
    max_concurrency: usize,
    game_window: Duration,
    game_allowlist: Vec<Address>,
    poll_interval: Duration,
    rpc_timeout: Duration,
    metrics_interval: Duration,
    progress_grace_period: Duration,
}

pub struct ChallengerConfigParams {
    pub l1_rpc_url: String,
    pub game_factory_address: Address,
    pub game_type: u32,
    pub datadir: PathBuf,
    pub max_concurrency: usize,
    pub game_window: Duration,
    pub game_allowlist: Vec<Address>,
    pub poll_interval: Duration,
    pub rpc_timeout: Duration,
    pub metrics_interval: Duration,
    pub progress_grace_period: Duration,
}

impl ChallengerConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> ChallengerConfigBuilder {
        ChallengerConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    pub fn new(params: ChallengerConfigParams) -> Result<Self> {
        let ChallengerConfigParams {
            l1_rpc_url,
            game_factory_address,
            game_type,
            datadir,
            max_concurrency,
            game_window,
            game_allowlist,
            poll_interval,
            rpc_timeout,
            metrics_interval,
            progress_grace_period,
        } = params;

        let mut game_allowlist = game_allowlist;
        game_allowlist.sort();
        game_allowlist.dedup();

        let config = Self {
            l1_rpc_url: l1_rpc_url.trim().to_owned(),
            game_factory_address,
            game_type,
            datadir,
            max_concurrency,
            game_window,
            game_allowlist,
            poll_interval,
            rpc_timeout,
            metrics_interval,
            progress_grace_period,
        };

        config.validate()?;
        Ok(config)
    }

    /// L1 JSON-RPC endpoint (including scheme).
    pub fn l1_rpc_url(&self) -> &str {
        &self.l1_rpc_url
    }

    pub fn game_factory_address(&self) -> Address {
        self.game_factory_address
    }

    /// Game type whose implementation supplies the absolute prestate.
    pub fn game_type(&self) -> u32 {
        self.game_type
    }

    /// Root directory for per-game working directories.
    pub fn datadir(&self) -> &Path {
        &self.datadir
    }

    /// Upper bound on concurrently executing progress calls.
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// How far back from the chain head a game's creation may lie and still
    /// be played.
    pub fn game_window(&self) -> Duration {
        self.game_window
    }

    /// Sorted, deduplicated allowlist. Empty allows every game.
    pub fn game_allowlist(&self) -> &[Address] {
        &self.game_allowlist
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// How long `close` waits for an in-flight progress call before
    /// abandoning it.
    pub fn progress_grace_period(&self) -> Duration {
        self.progress_grace_period
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        validate_url(&self.l1_rpc_url)?;

        if self.game_factory_address == Address::ZERO {
            bail!("game_factory_address cannot be the zero address");
        }

        if self.datadir.as_os_str().is_empty() {
            bail!("datadir cannot be empty");
        }

        if self.max_concurrency == 0 {
            bail!("max_concurrency must be greater than 0");
        }

        if self.game_window.as_secs() == 0 {
            bail!("game_window must be at least one second");
        }

        if self.poll_interval.is_zero() {
            bail!("poll_interval must be greater than 0");
        }

        if self.rpc_timeout.is_zero() {
            bail!("rpc_timeout must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct ChallengerConfigBuilder {
    l1_rpc_url: Option<String>,
    game_factory_address: Option<Address>,
    game_type: Option<u32>,
    datadir: Option<PathBuf>,
    max_concurrency: Option<usize>,
    game_window: Option<Duration>,
    game_allowlist: Vec<Address>,
    poll_interval: Option<Duration>,
    rpc_timeout: Option<Duration>,
    metrics_interval: Option<Duration>,
    progress_grace_period: Option<Duration>,
}

impl ChallengerConfigBuilder {
    pub fn l1_rpc_url(mut self, url: impl Into<String>) -> Self {
        self.l1_rpc_url = Some(url.into());
        self
    }

    pub fn game_factory_address(mut self, address: Address) -> Self {
        self.game_factory_address = Some(address);
        self
    }

    pub fn game_type(mut self, game_type: u32) -> Self {
        self.game_type = Some(game_type);
        self
    }

    pub fn datadir(mut self, datadir: impl Into<PathBuf>) -> Self {
        self.datadir = Some(datadir.into());
        self
    }

    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = Some(max_concurrency);
        self
    }

    pub fn game_window(mut self, window: Duration) -> Self {
        self.game_window = Some(window);
        self
    }

    pub fn game_allowlist(mut self, allowlist: impl IntoIterator<Item = Address>) -> Self {
        self.game_allowlist = allowlist.into_iter().collect();
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = Some(timeout);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn progress_grace_period(mut self, grace: Duration) -> Self {
        self.progress_grace_period = Some(grace);
        self
    }

    pub fn build(self) -> Result<ChallengerConfig> {
        let params = ChallengerConfigParams {
            l1_rpc_url: self.l1_rpc_url.context("l1_rpc_url is required")?,
            game_factory_address: self
                .game_factory_address
                .context("game_factory_address is required")?,
            game_type: self.game_type.unwrap_or(DEFAULT_GAME_TYPE),
            datadir: self.datadir.context("datadir is required")?,
            max_concurrency: self.max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY),
            game_window: self
                .game_window
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_GAME_WINDOW_SECS)),
            game_allowlist: self.game_allowlist,
            poll_interval: self
                .poll_interval
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)),
            rpc_timeout: self
                .rpc_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_RPC_TIMEOUT_SECS)),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
            progress_grace_period: self
                .progress_grace_period
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_PROGRESS_GRACE_PERIOD_SECS)),
        };

        ChallengerConfig::new(params)
    }
}

fn validate_url(url: &str) -> Result<()> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("l1_rpc_url must start with http:// or https://");
    }
    Ok(())
}
