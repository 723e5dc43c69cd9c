use crate::game::loader::{ChainReadError, PrestateSource};
use alloy::primitives::{keccak256, Bytes, B256};
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use std::path::PathBuf;
use thiserror::Error;

/// Off-chain component that produces the execution trace for games.
pub trait TraceProvider: Send + Sync {
    /// Raw bytes of the absolute prestate the trace starts from.
    fn absolute_prestate(&self) -> BoxFuture<'_, Result<Bytes>>;
}

/// Reads the absolute prestate from a file exported by the trace tooling.
#[derive(Debug, Clone)]
pub struct FilePrestateProvider {
    path: PathBuf,
}

impl FilePrestateProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TraceProvider for FilePrestateProvider {
    fn absolute_prestate(&self) -> BoxFuture<'_, Result<Bytes>> {
        Box::pin(async move {
            let raw = tokio::fs::read(&self.path).await.with_context(|| {
                format!("failed to read prestate file {}", self.path.display())
            })?;
            Ok(Bytes::from(raw))
        })
    }
}

#[derive(Debug, Error)]
pub enum PrestateError {
    #[error("failed to get the trace provider's absolute prestate: {0:#}")]
    Provider(anyhow::Error),
    #[error("failed to get the onchain absolute prestate: {0}")]
    OnChain(#[from] ChainReadError),
    #[error(
        "trace provider's absolute prestate hash {provider} does not match onchain absolute prestate {onchain}"
    )]
    Mismatch { provider: B256, onchain: B256 },
}

impl PrestateError {
    pub fn is_mismatch(&self) -> bool {
        matches!(self, PrestateError::Mismatch { .. })
    }
}

/// Checks that the trace provider starts from the prestate committed on chain.
///
/// Runs once before any game is scheduled. Every error is fatal: playing games
/// against an inconsistent trace environment cannot be recovered by retrying.
pub async fn validate_absolute_prestate(
    trace: &dyn TraceProvider,
    loader: &dyn PrestateSource,
) -> Result<(), PrestateError> {
    let provider_prestate = trace
        .absolute_prestate()
        .await
        .map_err(PrestateError::Provider)?;
    let provider = keccak256(&provider_prestate);
    let onchain = loader.fetch_absolute_prestate_hash().await?;

    if provider != onchain {
        return Err(PrestateError::Mismatch { provider, onchain });
    }

    tracing::info!(prestate = %onchain, "absolute prestate matches onchain commitment");
    Ok(())
}
