//! JSON-RPC client plumbing: the Ethereum client, metrics, retry policy, and
//! hex helpers.

pub mod client;
pub mod helpers;
pub mod metrics;
pub mod options;
pub mod retry;

pub use client::{EthRpcClient, RpcError};
pub use metrics::RpcMetricsSnapshot;
pub use options::RpcClientOptions;
