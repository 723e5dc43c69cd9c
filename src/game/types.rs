use alloy::primitives::Address;
use std::fmt;
use std::time::Duration;

/// A dispute game discovered through the factory contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Game {
    pub address: Address,
    pub game_type: u32,
    /// Creation timestamp recorded by the factory, in seconds.
    pub created_at: u64,
}

impl Game {
    pub fn new(address: Address, game_type: u32, created_at: u64) -> Self {
        Self {
            address,
            game_type,
            created_at,
        }
    }
}

/// Status reported by a player after each progress step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    InProgress,
    ChallengerWon,
    DefenderWon,
}

impl GameStatus {
    /// Terminal statuses act as the resolution signal for the scheduler.
    pub fn is_resolved(self) -> bool {
        !matches!(self, GameStatus::InProgress)
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GameStatus::InProgress => "in_progress",
            GameStatus::ChallengerWon => "challenger_won",
            GameStatus::DefenderWon => "defender_won",
        };
        f.write_str(label)
    }
}

/// Latest L1 block observed by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainHead {
    pub number: u64,
    pub timestamp: u64,
}

/// Range of creation timestamps considered in scope for one poll.
///
/// The range is half-open: `(head.timestamp - duration, head.timestamp]`. A game
/// created exactly `duration` seconds before the head has aged out, while a
/// game created in the head block itself is in scope. The lower bound
/// saturates at zero on young chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameWindow {
    pub head: ChainHead,
    pub duration: Duration,
}

impl GameWindow {
    pub fn new(head: ChainHead, duration: Duration) -> Self {
        Self { head, duration }
    }

    /// Exclusive lower bound.
    pub fn earliest(&self) -> u64 {
        self.head.timestamp.saturating_sub(self.duration.as_secs())
    }

    /// Inclusive upper bound.
    pub fn latest(&self) -> u64 {
        self.head.timestamp
    }

    pub fn contains(&self, created_at: u64) -> bool {
        created_at > self.earliest() && created_at <= self.latest()
    }
}
