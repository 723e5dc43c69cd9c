use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use alloy::primitives::{keccak256, Address, Bytes, B256};
use anyhow::{bail, Result};
use faultmon::{
    ChallengerConfig, ChallengerConfigBuilder, Game, GamePlayer, GameStatus, PlayerFactory,
    PlayerFuture, Service, TraceProvider,
};
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use tempfile::TempDir;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use super::mock_rpc::{MockChain, MockRpcServer};

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

pub fn game_address(seed: u8) -> Address {
    Address::repeat_byte(seed)
}

pub const HEAD_NUMBER: u64 = 100;
pub const HEAD_TIMESTAMP: u64 = 1_700_000_000;
pub const WINDOW: Duration = Duration::from_secs(3_600);
pub const GAME_TYPE: u32 = 0;

pub fn factory_address() -> Address {
    Address::repeat_byte(0xfa)
}

pub fn implementation_address() -> Address {
    Address::repeat_byte(0x1e)
}

pub const PRESTATE: &[u8] = b"cannon-absolute-prestate";

pub fn prestate_hash() -> B256 {
    keccak256(PRESTATE)
}

/// Trace provider serving a fixed in-memory prestate.
pub struct StaticTrace(pub Bytes);

impl StaticTrace {
    pub fn matching() -> Self {
        Self(Bytes::from_static(PRESTATE))
    }
}

impl TraceProvider for StaticTrace {
    fn absolute_prestate(&self) -> BoxFuture<'_, Result<Bytes>> {
        let prestate = self.0.clone();
        Box::pin(async move { Ok(prestate) })
    }
}

#[derive(Default)]
struct RecorderState {
    calls: HashMap<Address, usize>,
    created: Vec<(Address, PathBuf)>,
    resolve: HashSet<Address>,
}

/// Player factory that records every player it builds and every
/// `progress_game` call those players receive.
#[derive(Clone, Default)]
pub struct RecordingPlayerFactory {
    state: Arc<Mutex<RecorderState>>,
}

impl RecordingPlayerFactory {
    /// Players for `address` report the game as won from now on.
    pub fn resolve(&self, address: Address) {
        self.state.lock().unwrap().resolve.insert(address);
    }

    pub fn calls(&self, address: Address) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(&address)
            .copied()
            .unwrap_or(0)
    }

    pub fn created(&self) -> Vec<(Address, PathBuf)> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn dir_of(&self, address: Address) -> Option<PathBuf> {
        self.state
            .lock()
            .unwrap()
            .created
            .iter()
            .rev()
            .find(|(created, _)| *created == address)
            .map(|(_, dir)| dir.clone())
    }
}

impl PlayerFactory for RecordingPlayerFactory {
    fn create_player(&self, game: &Game, dir: &Path) -> Result<Arc<dyn GamePlayer>> {
        if !dir.is_dir() {
            bail!("working directory {} was not created", dir.display());
        }
        self.state
            .lock()
            .unwrap()
            .created
            .push((game.address, dir.to_path_buf()));
        Ok(Arc::new(RecordingPlayer {
            address: game.address,
            state: self.state.clone(),
        }))
    }
}

struct RecordingPlayer {
    address: Address,
    state: Arc<Mutex<RecorderState>>,
}

impl GamePlayer for RecordingPlayer {
    fn progress_game<'a>(&'a self, _cancel: &'a CancellationToken) -> PlayerFuture<'a> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            *state.calls.entry(self.address).or_default() += 1;
            if state.resolve.contains(&self.address) {
                Ok(GameStatus::DefenderWon)
            } else {
                Ok(GameStatus::InProgress)
            }
        })
    }
}

/// Polls `condition` every 25ms until it holds or `timeout` elapses.
pub async fn wait_for(
    what: &str,
    timeout: Duration,
    mut condition: impl FnMut() -> bool,
) -> Result<()> {
    let start = Instant::now();
    loop {
        if condition() {
            return Ok(());
        }
        if start.elapsed() > timeout {
            bail!("timed out after {timeout:?} waiting for {what}");
        }
        sleep(Duration::from_millis(25)).await;
    }
}

/// Mock L1 with a registered game implementation, a scratch datadir and a
/// recording player factory.
pub struct Fixture {
    pub chain: MockChain,
    pub server: MockRpcServer,
    pub datadir: TempDir,
    pub players: RecordingPlayerFactory,
}

impl Fixture {
    pub async fn start() -> Result<Self> {
        init_tracing();
        let chain = MockChain::new(factory_address(), HEAD_NUMBER, HEAD_TIMESTAMP);
        chain.register_implementation(GAME_TYPE, implementation_address(), prestate_hash());
        let server = MockRpcServer::start(chain.clone()).await?;
        Ok(Self {
            chain,
            server,
            datadir: TempDir::new()?,
            players: RecordingPlayerFactory::default(),
        })
    }

    /// Creates a game `age` seconds older than the current head.
    pub fn create_game(&self, seed: u8, age: u64) -> Address {
        let address = game_address(seed);
        let (_, timestamp) = self.chain.head();
        self.chain.create_game(GAME_TYPE, timestamp - age, address);
        address
    }

    pub fn config(&self) -> ChallengerConfigBuilder {
        ChallengerConfig::builder()
            .l1_rpc_url(self.server.url())
            .game_factory_address(factory_address())
            .game_type(GAME_TYPE)
            .datadir(self.datadir.path())
            .max_concurrency(2)
            .game_window(WINDOW)
            .poll_interval(Duration::from_millis(20))
            .rpc_timeout(Duration::from_secs(2))
            .metrics_interval(Duration::from_millis(200))
            .progress_grace_period(Duration::from_millis(500))
    }

    pub async fn connect(&self, config: ChallengerConfigBuilder) -> Result<Service> {
        Service::connect(
            config.build()?,
            Arc::new(StaticTrace::matching()),
            Arc::new(self.players.clone()),
        )
        .await
    }

    pub fn game_dir(&self, address: Address) -> PathBuf {
        self.datadir.path().join(format!("game-{address}"))
    }

    pub async fn shutdown(self) {
        self.server.shutdown().await;
    }
}
