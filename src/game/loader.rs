//! Chain-facing discovery: enumerates games through the dispute game factory
//! and resolves the absolute prestate committed by the game implementation.
//! Every call re-reads chain state; nothing is cached between polls.

use crate::game::contracts::{IDisputeGameFactory, IFaultDisputeGame};
use crate::game::types::{Game, GameWindow};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::SolCall;
use anyhow::{bail, Context, Result};
use futures::future::BoxFuture;
use std::sync::Arc;
use thiserror::Error;

/// Failure to read state from the chain. Callers treat it as transient during
/// steady-state polling.
#[derive(Debug, Error)]
#[error("failed to read {operation} from chain: {cause:#}")]
pub struct ChainReadError {
    pub operation: &'static str,
    cause: anyhow::Error,
}

impl ChainReadError {
    pub fn new(operation: &'static str, cause: anyhow::Error) -> Self {
        Self { operation, cause }
    }
}

/// Raw `eth_call` capability. `block` pins the call to a specific height;
/// `None` reads the latest state.
pub trait ContractCaller: Send + Sync {
    fn call<'a>(
        &'a self,
        to: Address,
        data: Bytes,
        block: Option<u64>,
    ) -> BoxFuture<'a, Result<Bytes>>;
}

pub trait GameSource: Send + Sync {
    /// Returns the games created inside `window`, oldest first.
    fn fetch_games<'a>(
        &'a self,
        window: &'a GameWindow,
    ) -> BoxFuture<'a, Result<Vec<Game>, ChainReadError>>;
}

pub trait PrestateSource: Send + Sync {
    fn fetch_absolute_prestate_hash(&self) -> BoxFuture<'_, Result<B256, ChainReadError>>;
}

pub struct GameLoader {
    caller: Arc<dyn ContractCaller>,
    factory: Address,
    game_type: u32,
}

impl GameLoader {
    pub fn new(caller: Arc<dyn ContractCaller>, factory: Address, game_type: u32) -> Self {
        Self {
            caller,
            factory,
            game_type,
        }
    }

    pub fn factory(&self) -> Address {
        self.factory
    }

    async fn load_games(&self, window: &GameWindow) -> Result<Vec<Game>> {
        let block = Some(window.head.number);
        let count = self
            .call_contract(self.factory, IDisputeGameFactory::gameCountCall {}, block)
            .await?;
        let count = u64::try_from(count).context("factory game count does not fit in u64")?;

        // Games are appended in creation order, so walk backwards from the
        // newest and stop at the first one that has aged out of the window.
        let mut games = Vec::new();
        for index in (0..count).rev() {
            let entry = self
                .call_contract(
                    self.factory,
                    IDisputeGameFactory::gameAtIndexCall {
                        _index: U256::from(index),
                    },
                    block,
                )
                .await
                .with_context(|| format!("failed to load game at index {index}"))?;

            if entry.timestamp_ <= window.earliest() {
                break;
            }
            if entry.timestamp_ > window.latest() {
                continue;
            }
            games.push(Game::new(entry.proxy_, entry.gameType_, entry.timestamp_));
        }

        games.reverse();
        tracing::debug!(
            block = window.head.number,
            total = count,
            in_window = games.len(),
            "loaded games from factory"
        );
        Ok(games)
    }

    async fn load_prestate_hash(&self) -> Result<B256> {
        let implementation = self
            .call_contract(
                self.factory,
                IDisputeGameFactory::gameImplsCall {
                    _gameType: self.game_type,
                },
                None,
            )
            .await?;
        if implementation == Address::ZERO {
            bail!(
                "no implementation registered for game type {}",
                self.game_type
            );
        }

        self.call_contract(
            implementation,
            IFaultDisputeGame::absolutePrestateCall {},
            None,
        )
        .await
    }

    async fn call_contract<C: SolCall>(
        &self,
        to: Address,
        call: C,
        block: Option<u64>,
    ) -> Result<C::Return> {
        let output = self
            .caller
            .call(to, Bytes::from(call.abi_encode()), block)
            .await
            .with_context(|| format!("eth_call {} on {to} failed", C::SIGNATURE))?;
        C::abi_decode_returns(&output)
            .with_context(|| format!("failed to decode {} response", C::SIGNATURE))
    }
}

impl GameSource for GameLoader {
    fn fetch_games<'a>(
        &'a self,
        window: &'a GameWindow,
    ) -> BoxFuture<'a, Result<Vec<Game>, ChainReadError>> {
        Box::pin(async move {
            self.load_games(window)
                .await
                .map_err(|cause| ChainReadError::new("games", cause))
        })
    }
}

impl PrestateSource for GameLoader {
    fn fetch_absolute_prestate_hash(&self) -> BoxFuture<'_, Result<B256, ChainReadError>> {
        Box::pin(async move {
            self.load_prestate_hash()
                .await
                .map_err(|cause| ChainReadError::new("absolute prestate", cause))
        })
    }
}
