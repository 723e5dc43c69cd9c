//! Keeps one game player alive per in-scope game and progresses them on a
//! bounded worker pool.

mod coordinator;
pub mod disk;
mod engine;
mod types;
mod worker_pool;

pub use disk::DiskManager;
pub use engine::{GameScheduler, Scheduler, SchedulerParams};
pub use types::SchedulerError;
