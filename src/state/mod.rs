//! Durable position state.
//!
//! The state file is the bot's memory across restarts: which side it is on,
//! the reference prices that anchor the next trade, and the running
//! counters. Saves are atomic with respect to process crash (write to a
//! temporary path, then rename) so a crash mid-write never leaves an
//! unparseable file behind. Losing that guarantee reintroduces the
//! buys-when-it-should-sell failure this module exists to prevent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::models::PositionSide;
use crate::strategy::ReferencePrices;

/// Snapshot written to disk after every executed trade and at shutdown.
///
/// Field names and types are a stable contract; every field defaults so
/// that files written by older versions still parse.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PersistedState {
    #[serde(default)]
    pub position: PositionSide,
    #[serde(default)]
    pub last_buy_price: Option<f64>,
    #[serde(default)]
    pub last_sell_price: Option<f64>,
    #[serde(default)]
    pub total_trades: u64,
    #[serde(default)]
    pub wins: u64,
    #[serde(default)]
    pub losses: u64,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PersistedState {
    pub fn refs(&self) -> ReferencePrices {
        ReferencePrices {
            last_buy_price: self.last_buy_price,
            last_sell_price: self.last_sell_price,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to write state file: {0}")]
    Write(#[source] std::io::Error),
    #[error("failed to replace state file: {0}")]
    Rename(#[source] std::io::Error),
    #[error("failed to encode state: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Owns the on-disk representation and the load/save protocol.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted state, falling back to a conservative default.
    ///
    /// A missing or unparseable file is a recovery event, not a fatal
    /// error: the bot starts over from the cash position and lets
    /// reconciliation correct it against real balances.
    pub async fn load(&self) -> PersistedState {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No state file found, starting fresh");
                return PersistedState::default();
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Could not read state file, recovering with default state"
                );
                return PersistedState::default();
            }
        };

        match serde_json::from_str::<PersistedState>(&raw) {
            Ok(state) => {
                tracing::info!(
                    position = ?state.position,
                    total_trades = state.total_trades,
                    "Restored state from {}",
                    self.path.display()
                );
                state
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "State file is corrupt, recovering with default state"
                );
                PersistedState::default()
            }
        }
    }

    /// Persist the state atomically: write `<path>.tmp`, fsync, rename.
    ///
    /// A crash at any point leaves either the previous valid snapshot or
    /// the new one on disk, never a half-written file.
    pub async fn save(&self, state: &PersistedState) -> Result<(), StateError> {
        let mut state = state.clone();
        state.updated_at = Some(Utc::now());

        let data = serde_json::to_vec_pretty(&state).map_err(StateError::Encode)?;

        let tmp_path = self.tmp_path();
        let mut tmp = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(StateError::Write)?;
        tmp.write_all(&data).await.map_err(StateError::Write)?;
        tmp.sync_all().await.map_err(StateError::Write)?;
        drop(tmp);

        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(StateError::Rename)?;

        tracing::debug!(path = %self.path.display(), "State saved");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        tmp.into()
    }
}
