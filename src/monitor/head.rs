use crate::game::ChainHead;
use anyhow::Result;
use futures::future::BoxFuture;

/// Supplies the latest L1 block the monitor should react to.
pub trait ChainHeadSource: Send + Sync {
    fn latest_head(&self) -> BoxFuture<'_, Result<ChainHead>>;
}
