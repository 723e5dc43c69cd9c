use crate::game::types::{Game, GameStatus};
use anyhow::Result;
use core::future::Future;
use core::pin::Pin;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub type PlayerFuture<'a> = Pin<Box<dyn Future<Output = Result<GameStatus>> + Send + 'a>>;

/// Off-chain actor that computes and submits moves for a single game.
pub trait GamePlayer: Send + Sync + 'static {
    /// Performs one step of work and reports the game's status afterwards.
    ///
    /// Implementations should return promptly once `cancel` fires; the
    /// scheduler abandons calls that outlive its shutdown grace period.
    fn progress_game<'a>(&'a self, cancel: &'a CancellationToken) -> PlayerFuture<'a>;
}

/// Builds players for newly discovered games.
pub trait PlayerFactory: Send + Sync + 'static {
    /// `dir` is the game's private working directory, already created.
    fn create_player(&self, game: &Game, dir: &Path) -> Result<Arc<dyn GamePlayer>>;
}
