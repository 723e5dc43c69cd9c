pub mod game;
pub mod monitor;
pub mod rpc;
pub mod runtime;
pub mod scheduler;

pub use game::{
    validate_absolute_prestate, ChainHead, ChainReadError, ContractCaller, FilePrestateProvider,
    Game, GameLoader, GamePlayer, GameSource, GameStatus, GameWindow, PlayerFactory, PlayerFuture,
    PrestateError, PrestateSource, TraceProvider,
};
pub use monitor::{ChainHeadSource, GameMonitor, MonitorParams};
pub use rpc::{EthRpcClient, RpcClientOptions, RpcError, RpcMetricsSnapshot};
pub use runtime::config::{ChallengerConfig, ChallengerConfigBuilder, ChallengerConfigParams};
pub use runtime::runner::Runner;
pub use runtime::service::{Service, ServiceParts};
pub use runtime::telemetry::{init_tracing, spawn_metrics_reporter, Telemetry, TelemetrySnapshot};
pub use scheduler::{DiskManager, GameScheduler, Scheduler, SchedulerError, SchedulerParams};
