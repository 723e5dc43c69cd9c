//! Per-game working directories under the configured data directory.
//!
//! Directory lifetime follows the scheduler's player slots: a directory is
//! created when a game gets a player and deleted when the slot is dropped.
//! Eviction is driven by scope membership only, never by disk usage.

use alloy::primitives::Address;
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const GAME_DIR_PREFIX: &str = "game-";

#[derive(Debug)]
pub struct DiskManager {
    datadir: PathBuf,
    entries: Mutex<HashMap<Address, PathBuf>>,
}

impl DiskManager {
    pub fn new(datadir: impl Into<PathBuf>) -> Self {
        Self {
            datadir: datadir.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn datadir(&self) -> &Path {
        &self.datadir
    }

    /// Location of the working directory for `address`, whether or not it
    /// exists yet.
    pub fn path_for(&self, address: Address) -> PathBuf {
        self.datadir.join(game_dir_name(address))
    }

    /// Returns the working directory for `address`, creating it on first use.
    pub fn dir_for(&self, address: Address) -> Result<PathBuf> {
        let mut entries = self.lock_entries();
        if let Some(existing) = entries.get(&address) {
            return Ok(existing.clone());
        }

        let dir = self.path_for(address);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create game directory {}", dir.display()))?;
        entries.insert(address, dir.clone());
        tracing::debug!(game = %address, dir = %dir.display(), "allocated game directory");
        Ok(dir)
    }

    /// Deletes the directory tree for `address`. Releasing an unknown address
    /// is a no-op. The entry stays tracked when removal fails, so the release
    /// can be retried.
    pub fn release(&self, address: Address) -> Result<()> {
        let mut entries = self.lock_entries();
        let Some(dir) = entries.get(&address).cloned() else {
            return Ok(());
        };

        remove_dir_if_present(&dir)?;
        entries.remove(&address);
        tracing::debug!(game = %address, dir = %dir.display(), "released game directory");
        Ok(())
    }

    /// Stops tracking `address` without touching its directory.
    pub fn forget(&self, address: Address) {
        self.lock_entries().remove(&address);
    }

    /// Deletes game directories left under the data directory that are neither
    /// tracked nor listed in `keep`. Files and directories that do not follow
    /// the game directory naming scheme are left alone.
    pub fn remove_all_except(&self, keep: &[Address]) -> Result<usize> {
        let entries = self.lock_entries();
        let mut retained: HashSet<String> = keep.iter().copied().map(game_dir_name).collect();
        retained.extend(entries.keys().copied().map(game_dir_name));

        let listing = match std::fs::read_dir(&self.datadir) {
            Ok(listing) => listing,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to list data directory {}", self.datadir.display())
                })
            }
        };

        let mut removed = 0;
        for entry in listing {
            let entry = entry.context("failed to read data directory entry")?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.starts_with(GAME_DIR_PREFIX) || retained.contains(name) {
                continue;
            }
            if !entry.file_type().map(|kind| kind.is_dir()).unwrap_or(false) {
                continue;
            }

            remove_dir_if_present(&entry.path())?;
            removed += 1;
        }

        if removed > 0 {
            tracing::info!(removed, "removed stale game directories");
        }
        Ok(removed)
    }

    /// Number of tracked directories.
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, address: Address) -> bool {
        self.lock_entries().contains_key(&address)
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<Address, PathBuf>> {
        // A panic while holding the lock cannot leave the map half-updated,
        // so a poisoned guard is still usable.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn game_dir_name(address: Address) -> String {
    format!("{GAME_DIR_PREFIX}{address}")
}

fn remove_dir_if_present(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => {
            Err(err).with_context(|| format!("failed to remove game directory {}", dir.display()))
        }
    }
}
