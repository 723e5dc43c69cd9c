//! Ethereum JSON-RPC client used for chain-head polling and contract reads.
//! Houses the `EthRpcClient`, its error type, and the capability trait
//! implementations consumed by the game loader and monitor.

use crate::game::{ChainHead, ContractCaller};
use crate::monitor::ChainHeadSource;
use crate::rpc::helpers::{decode_data, encode_quantity, parse_quantity};
use crate::rpc::metrics::{RpcMetrics, RpcMetricsSnapshot};
use crate::rpc::options::RpcClientOptions;
use crate::rpc::retry::{
    RetryContext, CHAIN_ID_RETRY, ETH_CALL_RETRY, LATEST_HEAD_RETRY};
use crate::runtime::config::ChallengerConfig;
use alloy::primitives::{hex, Address, Bytes};
use anyhow::{anyhow, Context, Result};
use futures::future::BoxFuture;
use jsonrpsee::core::client::{ClientT, Error as JsonRpcError};
use jsonrpsee::core::http_helpers::HttpError;
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::transport::Error as HttpTransportError;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::{future::Future, sync::Arc};
use thiserror::Error;
use tokio::time::{sleep, timeout, Instant};

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("rpc method {method} timed out")]
    Timeout { method: &'static str },
    /// The node answered with a JSON-RPC error object, e.g. a reverted call.
    #[error("rpc method {method} returned error {code}: {message}")]
    Call {
        method: &'static str,
        code: i32,
        message: String,
    },
    #[error("rpc {method} response exceeded HTTP size limits")]
    ResponseTooLarge { method: &'static str },
}

impl RpcError {
    fn is_retryable(&self) -> bool {
        matches!(self, RpcError::Timeout { .. })
    }
}

#[derive(Debug, Deserialize)]
struct RpcBlockHeader {
    number: String,
    timestamp: String,
}

#[derive(Debug, Clone)]
pub struct EthRpcClient {
    rpc_url: Arc<String>,
    client: HttpClient,
    options: RpcClientOptions,
    metrics: Arc<RpcMetrics>,
}

impl EthRpcClient {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_options(url, RpcClientOptions::default())
    }

    pub fn with_options(url: impl Into<String>, options: RpcClientOptions) -> Result<Self> {
        options.validate()?;

        let rpc_url = url.into();
        let max_response_body_size = options.max_response_body_bytes.min(u32::MAX as usize) as u32;

        let client = HttpClientBuilder::default()
            .request_timeout(options.request_timeout)
            .max_concurrent_requests(options.max_concurrent_requests)
            .max_response_size(max_response_body_size)
            .build(&rpc_url)
            .map_err(|err| anyhow!("failed to build RPC client: {err}"))?;

        Ok(Self {
            rpc_url: Arc::new(rpc_url),
            client,
            options,
            metrics: Arc::new(RpcMetrics::default()),
        })
    }

    pub fn from_config(config: &ChallengerConfig) -> Result<Self> {
        config.validate()?;
        let options = RpcClientOptions {
            request_timeout: config.rpc_timeout(),
            max_concurrent_requests: std::cmp::max(16, config.max_concurrency().saturating_mul(4)),
            ..RpcClientOptions::default()
        };
        Self::with_options(config.l1_rpc_url().to_owned(), options)
    }

    pub fn endpoint(&self) -> &str {
        &self.rpc_url
    }

    pub fn metrics(&self) -> RpcMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let raw: String = self
            .retry_request(RetryContext::new(&CHAIN_ID_RETRY), rpc_params![])
            .await?;
        parse_quantity(&raw).context("invalid eth_chainId response")
    }

    /// Number and timestamp of the latest block.
    pub async fn latest_head(&self) -> Result<ChainHead> {
        let header: Option<RpcBlockHeader> = self
            .retry_request(
                RetryContext::new(&LATEST_HEAD_RETRY),
                rpc_params!["latest", false],
            )
            .await?;
        let header = header.context("node returned no latest block")?;

        Ok(ChainHead {
            number: parse_quantity(&header.number).context("invalid block number")?,
            timestamp: parse_quantity(&header.timestamp).context("invalid block timestamp")?,
        })
    }

    /// Executes a read-only call against `to`, pinned to `block` when given.
    pub async fn call(&self, to: Address, data: &Bytes, block: Option<u64>) -> Result<Bytes> {
        let request = json!({
            "to": to.to_string(),
            "data": hex::encode_prefixed(data),
        });
        let tag = block.map_or_else(|| "latest".to_string(), encode_quantity);

        let raw: String = self
            .retry_request(
                RetryContext::at_block(&ETH_CALL_RETRY, block),
                rpc_params![request, tag],
            )
            .await?;
        decode_data(&raw).context("invalid eth_call response")
    }

    async fn retry_request<R>(&self, context: RetryContext<'_>, params: ArrayParams) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let method = context.method();
        self.retry_with_backoff(context, || async {
            timeout(
                self.options.request_timeout,
                self.client.request(method, params.clone()),
            )
            .await
            .map_err(|_| RpcError::Timeout { method })?
            .map_err(|err| map_rpc_error(method, err))
        })
        .await
    }

    /// Shared retry loop that wraps RPC operations with metrics, exponential
    /// backoff, and consistent logging. JSON-RPC error responses are returned
    /// immediately.
    async fn retry_with_backoff<T, F, Fut>(
        &self,
        context: RetryContext<'_>,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;
            let start = Instant::now();

            let err = match operation().await {
                Ok(value) => {
                    self.metrics.record_success(start.elapsed());
                    return Ok(value);
                }
                Err(err) => err,
            };

            let elapsed = start.elapsed();
            let rpc_error = err.downcast_ref::<RpcError>();
            if matches!(rpc_error, Some(RpcError::Timeout { .. })) {
                self.metrics.record_timeout(elapsed);
            } else {
                self.metrics.record_failure(elapsed);
            }

            if rpc_error.is_some_and(|rpc_error| !rpc_error.is_retryable()) {
                context.log_rejected(attempt, &err);
                return Err(err);
            }

            if attempt >= self.options.max_attempts {
                context.log_exhausted(attempt, &err);
                return Err(err);
            }

            let backoff = self.options.backoff_delay(attempt);
            if matches!(rpc_error, Some(RpcError::Timeout { .. })) {
                context.log_timeout(attempt, backoff);
            } else {
                context.log_retry(attempt, backoff, &err);
            }
            self.metrics.record_retry();
            sleep(backoff).await;
        }
    }
}

impl ChainHeadSource for EthRpcClient {
    fn latest_head(&self) -> BoxFuture<'_, Result<ChainHead>> {
        Box::pin(EthRpcClient::latest_head(self))
    }
}

impl ContractCaller for EthRpcClient {
    fn call<'a>(
        &'a self,
        to: Address,
        data: Bytes,
        block: Option<u64>,
    ) -> BoxFuture<'a, Result<Bytes>> {
        Box::pin(async move { EthRpcClient::call(self, to, &data, block).await })
    }
}

fn map_rpc_error(method: &'static str, err: JsonRpcError) -> anyhow::Error {
    if response_too_large(&err) {
        return RpcError::ResponseTooLarge { method }.into();
    }
    match err {
        JsonRpcError::Call(object) => RpcError::Call {
            method,
            code: object.code(),
            message: object.message().to_string(),
        }
        .into(),
        other => anyhow!("rpc {method} call failed: {other}"),
    }
}

fn response_too_large(err: &JsonRpcError) -> bool {
    match err {
        JsonRpcError::Transport(inner) => {
            if let Some(transport_err) = inner.downcast_ref::<HttpTransportError>() {
                match transport_err {
                    HttpTransportError::Http(http_err) => matches!(http_err, HttpError::TooLarge),
                    HttpTransportError::RequestTooLarge => true,
                    _ => false,
                }
            } else {
                false
            }
        }
        _ => false,
    }
}
