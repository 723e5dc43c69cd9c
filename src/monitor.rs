//! Chain-head driven loop that decides which games are in scope each block
//! and hands them to the scheduler.

mod game_monitor;
mod head;

pub use game_monitor::{GameMonitor, MonitorParams};
pub use head::ChainHeadSource;
