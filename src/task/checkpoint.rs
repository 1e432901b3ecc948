//! Best-reward state snapshot on disk.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::Result;
use crate::sim::SimState;

/// On-disk record, stored as a flat bincode blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub best_reward: f32,
    pub state: SimState,
    /// Unix seconds, UTC
    pub timestamp: i64,
}

/// Result of offering an episode to the checkpointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    NotImproved,
}

/// Keeps the best episode reward seen so far and the state it ended in.
#[derive(Debug)]
pub struct Checkpointer {
    path: PathBuf,
    best_reward: f32,
    best_state: Option<SimState>,
}

impl Checkpointer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            best_reward: f32::NEG_INFINITY,
            best_state: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn best_reward(&self) -> f32 {
        self.best_reward
    }

    pub fn best_state(&self) -> Option<&SimState> {
        self.best_state.as_ref()
    }

    /// Read the file into memory. A missing file leaves the defaults and
    /// returns `false`.
    pub fn load(&mut self) -> Result<bool> {
        Ok(self.load_checkpoint()?.is_some())
    }

    /// Like [`Checkpointer::load`], but hands back the decoded record.
    pub fn load_checkpoint(&mut self) -> Result<Option<Checkpoint>> {
        if !self.path.exists() {
            tracing::info!("No checkpoint at {}, starting fresh", self.path.display());
            return Ok(None);
        }

        let bytes = fs::read(&self.path)?;
        let checkpoint: Checkpoint = bincode::deserialize(&bytes)?;
        self.best_reward = checkpoint.best_reward;
        self.best_state = Some(checkpoint.state.clone());

        tracing::info!(
            "Loaded checkpoint from {} (best reward {:.3})",
            self.path.display(),
            checkpoint.best_reward
        );
        Ok(Some(checkpoint))
    }

    /// Overwrite the file when `total_reward` beats the best so far.
    pub fn save(&mut self, total_reward: f32, state: &SimState) -> Result<SaveOutcome> {
        if total_reward.is_nan() || total_reward <= self.best_reward {
            return Ok(SaveOutcome::NotImproved);
        }

        let checkpoint = Checkpoint {
            best_reward: total_reward,
            state: state.clone(),
            timestamp: OffsetDateTime::now_utc().unix_timestamp(),
        };
        let bytes = bincode::serialize(&checkpoint)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, bytes)?;

        self.best_reward = total_reward;
        self.best_state = Some(checkpoint.state);
        tracing::info!(
            "New best reward {:.3}, saved checkpoint to {}",
            total_reward,
            self.path.display()
        );
        Ok(SaveOutcome::Saved)
    }
}
