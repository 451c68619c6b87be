use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::config::CorruptPolicy;
use crate::error::BotError;

/// Per-account progress, persisted across runs. Field names match the JSON
/// state file. The default is the all-zero state for an unseen address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AccountState {
    pub balance: f64,
    pub pending_rewards: f64,
    pub points: u64,
    pub rank: u64,
    /// Epoch milliseconds of the last completed pipeline run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Durable key-value store of account progress, keyed by lowercased address.
///
/// Exclusively owned by the orchestrator process: a lock file next to the
/// state file turns a concurrent second instance into a startup error instead
/// of silent corruption. Saves are atomic (tmp write, then rename).
pub struct StateStore {
    path: PathBuf,
    lock_path: PathBuf,
    accounts: HashMap<String, AccountState>,
}

impl StateStore {
    pub fn open(path: &Path, policy: CorruptPolicy) -> Result<Self, BotError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    BotError::StateIo(format!("cannot create '{}': {}", parent.display(), e))
                })?;
            }
        }

        let lock_path = path.with_extension("lock");
        std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    BotError::StateIo(format!(
                        "lock file '{}' exists; another instance appears to be running (delete it if not)",
                        lock_path.display()
                    ))
                } else {
                    BotError::StateIo(format!("cannot create lock file '{}': {}", lock_path.display(), e))
                }
            })?;

        let accounts = match Self::read_snapshot(path) {
            Ok(map) => map,
            Err(BotError::StateCorrupt(msg)) if policy == CorruptPolicy::Reinit => {
                warn!("State file is corrupt ({}); reinitializing to an empty mapping", msg);
                HashMap::new()
            }
            Err(e) => {
                let _ = std::fs::remove_file(&lock_path);
                return Err(e);
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            lock_path,
            accounts,
        })
    }

    /// Read the state file without taking the lock. Used by read-only
    /// commands; the run path goes through `open`.
    pub fn read_snapshot(path: &Path) -> Result<HashMap<String, AccountState>, BotError> {
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| BotError::StateIo(format!("cannot read '{}': {}", path.display(), e)))?;
        if text.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&text).map_err(|e| BotError::StateCorrupt(e.to_string()))
    }

    /// The state for an address, or the default zero-state if unseen.
    pub fn get(&self, address: &str) -> AccountState {
        self.accounts
            .get(&address.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    /// Apply one account's update and persist the whole snapshot before
    /// returning. The next account must not start before this completes.
    pub fn merge<F>(&mut self, address: &str, update: F) -> Result<(), BotError>
    where
        F: FnOnce(&mut AccountState),
    {
        let entry = self
            .accounts
            .entry(address.to_ascii_lowercase())
            .or_default();
        update(entry);
        self.save()
    }

    /// Atomic replace: write a sibling tmp file, then rename over the
    /// original, so a crash mid-write never truncates prior state.
    pub fn save(&self) -> Result<(), BotError> {
        let json = serde_json::to_string_pretty(&self.accounts)
            .map_err(|e| BotError::StateIo(format!("cannot serialize state: {}", e)))?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| BotError::StateIo(format!("cannot write '{}': {}", tmp.display(), e)))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            BotError::StateIo(format!("cannot replace '{}': {}", self.path.display(), e))
        })?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl Drop for StateStore {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.lock_path);
    }
}
