//! Helpers for session consumers that cache server data.
//!
//! Data fetched under one session epoch may be stale once a token refresh
//! moved the epoch on. Consumers compare epochs themselves.

use serde::{Deserialize, Serialize};

/// Data tagged with the session epoch it was fetched under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochCached<T> {
    pub data: T,
    pub epoch: u64,
}

impl<T> EpochCached<T> {
    pub fn new(data: T, epoch: u64) -> Self {
        Self { data, epoch }
    }

    pub fn is_stale(&self, current_epoch: u64) -> bool {
        self.epoch != current_epoch
    }
}

/// Remembers the last epoch a consumer acted on.
#[derive(Debug, Default)]
pub struct EpochWatcher {
    last_seen: Option<u64>,
}

impl EpochWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// True the first time and whenever the epoch moved since the last call
    pub fn observe(&mut self, epoch: u64) -> bool {
        let changed = self.last_seen != Some(epoch);
        self.last_seen = Some(epoch);
        changed
    }
}
