//! Game-level domain types plus the chain-facing collaborators that discover
//! games, bind to the factory contract, and validate the absolute prestate.

pub mod contracts;
pub mod loader;
pub mod player;
pub mod prestate;
pub mod types;

pub use loader::{ChainReadError, ContractCaller, GameLoader, GameSource, PrestateSource};
pub use player::{GamePlayer, PlayerFactory, PlayerFuture};
pub use prestate::{validate_absolute_prestate, FilePrestateProvider, PrestateError, TraceProvider};
pub use types::{ChainHead, Game, GameStatus, GameWindow};
