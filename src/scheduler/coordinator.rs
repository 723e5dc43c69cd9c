//! Reconciles each tick's target game set against the live player slots.
//!
//! The coordinator is owned by a single task, so the slot map needs no
//! locking. It decides which players to create, which slots to drop, and which
//! games get a progress job; the worker pool executes the jobs and reports
//! back through [`Coordinator::process_result`].

use super::disk::DiskManager;
use super::types::{Job, JobResult, ProgressOutcome};
use crate::game::{Game, GamePlayer, GameStatus, PlayerFactory};
use crate::runtime::telemetry::Telemetry;
use alloy::primitives::Address;
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

struct PlayerSlot {
    game: Game,
    dir: PathBuf,
    player: Arc<dyn GamePlayer>,
    in_flight: bool,
    /// Left the target set while a call was in flight; dropped once it returns.
    retiring: bool,
    last_status: Option<GameStatus>,
    consecutive_failures: u32,
}

pub(crate) struct Coordinator {
    slots: HashMap<Address, PlayerSlot>,
    resolved: HashSet<Address>,
    /// Dropped slots whose directory could not be deleted yet.
    pending_release: HashSet<Address>,
    disk: Arc<DiskManager>,
    factory: Arc<dyn PlayerFactory>,
    telemetry: Arc<Telemetry>,
    swept: bool,
}

impl Coordinator {
    pub(crate) fn new(
        disk: Arc<DiskManager>,
        factory: Arc<dyn PlayerFactory>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            slots: HashMap::new(),
            resolved: HashSet::new(),
            pending_release: HashSet::new(),
            disk,
            factory,
            telemetry,
            swept: false,
        }
    }

    /// Applies one tick. Returns the progress jobs to hand to the pool, each
    /// for a distinct game whose slot is now marked in flight.
    pub(crate) fn schedule(&mut self, games: &[Game]) -> Vec<Job> {
        let targets: HashSet<Address> = games.iter().map(|game| game.address).collect();

        self.resolved.retain(|address| targets.contains(address));
        self.retry_pending_releases(&targets);
        self.retire_departed(&targets);

        if !self.swept {
            self.sweep_stale_dirs(&targets);
            self.swept = true;
        }

        let mut jobs = Vec::new();
        let mut seen = HashSet::with_capacity(targets.len());
        for game in games {
            let address = game.address;
            if !seen.insert(address) || self.resolved.contains(&address) {
                continue;
            }

            if !self.slots.contains_key(&address) {
                if let Err(err) = self.create_slot(game) {
                    self.telemetry.record_player_create_failure();
                    tracing::warn!(
                        game = %address,
                        error = format!("{err:#}"),
                        "skipping game this tick"
                    );
                    continue;
                }
            }

            let Some(slot) = self.slots.get_mut(&address) else {
                continue;
            };
            slot.retiring = false;
            if slot.in_flight {
                tracing::debug!(game = %address, "not rescheduling in-flight game");
                continue;
            }

            slot.in_flight = true;
            jobs.push(Job {
                address,
                player: slot.player.clone(),
            });
        }

        self.telemetry.record_active_players(self.slots.len());
        self.telemetry.record_jobs_enqueued(jobs.len());
        jobs
    }

    pub(crate) fn process_result(&mut self, result: JobResult) {
        let JobResult { address, outcome } = result;
        let Some(slot) = self.slots.get_mut(&address) else {
            tracing::warn!(game = %address, "received progress result for unknown game");
            return;
        };
        slot.in_flight = false;

        match outcome {
            ProgressOutcome::Completed(status) => {
                slot.last_status = Some(status);
                slot.consecutive_failures = 0;
                if status.is_resolved() {
                    tracing::info!(game = %address, %status, "game resolved");
                    self.resolved.insert(address);
                    self.telemetry.record_game_resolved();
                    self.remove_slot(address);
                    return;
                }
                tracing::debug!(game = %address, %status, "game progressed");
            }
            ProgressOutcome::Failed(err) => {
                slot.consecutive_failures = slot.consecutive_failures.saturating_add(1);
                self.telemetry.record_progress_error();
                tracing::warn!(
                    game = %address,
                    failures = slot.consecutive_failures,
                    error = format!("{err:#}"),
                    "failed to progress game; retrying next tick"
                );
            }
            ProgressOutcome::Abandoned => {
                tracing::debug!(game = %address, "progress call abandoned during shutdown");
            }
        }

        if slot.retiring {
            self.remove_slot(address);
        }
    }

    /// Drops every slot without deleting directories, so in-scope games can
    /// reuse their data after a restart.
    pub(crate) fn shutdown(&mut self) {
        for address in self.slots.keys().chain(self.pending_release.iter()) {
            self.disk.forget(*address);
        }
        self.slots.clear();
        self.pending_release.clear();
        self.resolved.clear();
        self.telemetry.record_active_players(0);
    }

    fn retire_departed(&mut self, targets: &HashSet<Address>) {
        let departed: Vec<Address> = self
            .slots
            .keys()
            .filter(|address| !targets.contains(*address))
            .copied()
            .collect();

        for address in departed {
            let Some(slot) = self.slots.get_mut(&address) else {
                continue;
            };
            if slot.in_flight {
                slot.retiring = true;
                tracing::debug!(game = %address, "game left scope while in flight");
            } else {
                tracing::info!(
                    game = %address,
                    created_at = slot.game.created_at,
                    last_status = ?slot.last_status,
                    dir = %slot.dir.display(),
                    "game left scope"
                );
                self.remove_slot(address);
            }
        }
    }

    /// Retries deleting directories of dropped slots. A game that came back
    /// into scope keeps its directory and gets a slot again below.
    fn retry_pending_releases(&mut self, targets: &HashSet<Address>) {
        let pending: Vec<Address> = self.pending_release.drain().collect();
        for address in pending {
            if targets.contains(&address) {
                continue;
            }
            self.release_dir(address);
        }
    }

    fn sweep_stale_dirs(&self, targets: &HashSet<Address>) {
        let keep: Vec<Address> = targets.iter().copied().collect();
        if let Err(err) = self.disk.remove_all_except(&keep) {
            tracing::warn!(error = format!("{err:#}"), "unable to clean up stale game data");
        }
    }

    fn create_slot(&mut self, game: &Game) -> Result<()> {
        let address = game.address;
        let reused = self.disk.path_for(address).is_dir();
        let dir = self.disk.dir_for(address)?;

        let player = match self.factory.create_player(game, &dir) {
            Ok(player) => player,
            Err(err) => {
                if reused {
                    // Data from an earlier run stays for the next attempt.
                    self.disk.forget(address);
                } else if let Err(release_err) = self.disk.release(address) {
                    tracing::warn!(
                        game = %address,
                        error = format!("{release_err:#}"),
                        "failed to release directory of unconstructed player"
                    );
                    self.pending_release.insert(address);
                }
                return Err(err).context("failed to create game player");
            }
        };

        tracing::info!(game = %address, dir = %dir.display(), "created game player");
        self.telemetry.record_player_created();
        self.slots.insert(
            address,
            PlayerSlot {
                game: *game,
                dir,
                player,
                in_flight: false,
                retiring: false,
                last_status: None,
                consecutive_failures: 0,
            },
        );
        Ok(())
    }

    fn remove_slot(&mut self, address: Address) {
        if self.slots.remove(&address).is_none() {
            return;
        }
        self.release_dir(address);
        self.telemetry.record_active_players(self.slots.len());
    }

    fn release_dir(&mut self, address: Address) {
        match self.disk.release(address) {
            Ok(()) => self.telemetry.record_game_released(),
            Err(err) => {
                tracing::warn!(
                    game = %address,
                    error = format!("{err:#}"),
                    "failed to delete game directory; retrying next tick"
                );
                self.pending_release.insert(address);
            }
        }
    }

    #[cfg(test)]
    fn slot_dir(&self, address: Address) -> Option<&std::path::Path> {
        self.slots.get(&address).map(|slot| slot.dir.as_path())
    }

    #[cfg(test)]
    fn last_status(&self, address: Address) -> Option<GameStatus> {
        self.slots.get(&address).and_then(|slot| slot.last_status)
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.len()
    }
}
